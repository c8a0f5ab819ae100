//! Mutation helpers: one method per UI action, each validating against
//! the in-memory collections, applying its change, appending the
//! matching activity entry and synchronizing through the gateway.
//!
//! Session operations (login, logout, register, password change)
//! persist with a plain save; entity mutations save and then reload so
//! the next render reflects exactly what was persisted.

use serde_json::json;
use shared::{
    generate_record_id, now_timestamp, Activity, DocumentAttachment, Payment, PaymentCategory,
    PaymentStatus, Process, ProcessAlert, ProcessLocation, Role, Snapshot, UserAccount,
};
use tracing::info;

use crate::error::StoreError;
use crate::gateway::PersistenceGateway;
use crate::policy::{self, Capability};
use crate::store::ClientStore;

const PROCESS_NOT_FOUND: &str = "Processo não encontrado.";
const PAYMENT_NOT_FOUND: &str = "Pagamento não encontrado.";
const USER_NOT_FOUND: &str = "Usuário não encontrado.";
const BLANK_CREDENTIALS: &str = "Preencha o nome de usuário e a senha.";
const DUPLICATE_USERNAME: &str = "Este nome de usuário já existe.";

/// Form payload for creating (`id: None`) or editing a process.
///
/// The process number is assigned at creation and never changed by an
/// edit: payments reference processes by that number, and renaming one
/// would strand them.
#[derive(Debug, Clone, Default)]
pub struct ProcessDraft {
    pub id: Option<String>,
    pub process_number: String,
    pub supplier: String,
    pub category: Option<PaymentCategory>,
    /// Free text required when `category` is `Outros`.
    pub category_other: String,
    pub description: String,
    pub documents: Vec<DocumentAttachment>,
}

/// Form payload for creating (`id: None`) or editing a payment.
#[derive(Debug, Clone, Default)]
pub struct PaymentDraft {
    pub id: Option<String>,
    pub process_number: String,
    pub supplier: String,
    /// `None` stands for an unparseable amount field.
    pub value: Option<f64>,
    pub payment_date: String,
    pub method: String,
    /// Free text required when `method` is `Outros`.
    pub method_other: String,
    pub status: Option<PaymentStatus>,
    pub description: String,
    pub proof: Option<DocumentAttachment>,
}

impl<G: PersistenceGateway> ClientStore<G> {
    /// Log in against the users collection. The session and its
    /// activity entry are kept even when the follow-up save fails; the
    /// entry goes out with the next successful write.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), StoreError> {
        let account = self
            .data
            .users
            .iter()
            .find(|u| u.username == username && u.password == password)
            .ok_or_else(|| StoreError::Invalid("Usuário ou senha inválidos.".to_string()))?;

        let username = account.username.clone();
        self.session = Some(username.clone());
        record_activity(
            &mut self.data,
            &username,
            "Login",
            format!("Usuário {username} fez login."),
            json!({}),
        );
        info!("user {username} logged in");
        self.save().await
    }

    /// Log out of the current session. The session is cleared even when
    /// the save fails.
    pub async fn logout(&mut self) -> Result<(), StoreError> {
        let username = self.require_session()?;
        record_activity(
            &mut self.data,
            &username,
            "Logout",
            format!("Usuário {username} fez logout."),
            json!({}),
        );
        info!("user {username} logged out");
        let result = self.save().await;
        self.session = None;
        result
    }

    /// Create an account from the login screen. The very first account
    /// bootstraps as admin; after that only admins may register new
    /// accounts, which start as plain members.
    pub async fn register(&mut self, username: &str, password: &str) -> Result<(), StoreError> {
        if username.is_empty() || password.is_empty() {
            return Err(StoreError::Invalid(BLANK_CREDENTIALS.to_string()));
        }
        let bootstrap = self.data.users.is_empty();
        if !bootstrap {
            self.authorize(Capability::ManageUsers)?;
        }
        if self.data.users.iter().any(|u| u.username == username) {
            return Err(StoreError::Invalid(DUPLICATE_USERNAME.to_string()));
        }

        self.data.users.push(UserAccount {
            username: username.to_string(),
            password: password.to_string(),
            role: bootstrap.then_some(Role::Admin),
        });
        info!("registered account {username}");
        self.save().await
    }

    /// Create an account from the settings panel (admin only), logging
    /// the creation.
    pub async fn add_user(&mut self, username: &str, password: &str) -> Result<(), StoreError> {
        let actor = self.authorize(Capability::ManageUsers)?;
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(StoreError::Invalid(BLANK_CREDENTIALS.to_string()));
        }
        if self.data.users.iter().any(|u| u.username == username) {
            return Err(StoreError::Invalid(DUPLICATE_USERNAME.to_string()));
        }

        self.data.users.push(UserAccount {
            username: username.to_string(),
            password: password.to_string(),
            role: None,
        });
        record_activity(
            &mut self.data,
            &actor,
            "Criação de Usuário",
            format!("Novo usuário \"{username}\" foi criado."),
            json!({}),
        );
        self.sync().await
    }

    /// Change the logged-in account's password. Persists with a plain
    /// save; when that save fails the local password reverts so the
    /// in-memory credential still matches what the server holds.
    pub async fn change_password(
        &mut self,
        current: &str,
        new: &str,
        confirm: &str,
    ) -> Result<(), StoreError> {
        let username = self.require_session()?;
        if new != confirm {
            return Err(StoreError::Invalid(
                "As novas senhas não coincidem.".to_string(),
            ));
        }
        if new.chars().count() < 4 {
            return Err(StoreError::Invalid(
                "A nova senha deve ter pelo menos 4 caracteres.".to_string(),
            ));
        }
        let Some(index) = self.data.users.iter().position(|u| u.username == username) else {
            return Err(StoreError::NotAuthenticated);
        };
        if self.data.users[index].password != current {
            return Err(StoreError::Invalid("A senha atual está incorreta.".to_string()));
        }

        self.data.users[index].password = new.to_string();
        record_activity(
            &mut self.data,
            &username,
            "Alteração de Senha",
            format!("O usuário {username} alterou a própria senha."),
            json!({}),
        );
        match self.save().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.data.users[index].password = current.to_string();
                Err(err)
            }
        }
    }

    /// Create or update a process from its form draft. Creation
    /// enforces process-number uniqueness and stamps the defaults
    /// (accounting location, creation time); an update keeps the
    /// number, the importance flag and the alert untouched.
    pub async fn save_process(&mut self, draft: ProcessDraft) -> Result<(), StoreError> {
        self.require_session()?;
        let user = self.acting_user();

        let number = draft.process_number.trim().to_string();
        let supplier = draft.supplier.trim().to_string();
        let Some(category) = draft.category else {
            return Err(StoreError::Invalid(
                "Preencha Nº Processo, Fornecedor e Modalidade!".to_string(),
            ));
        };
        if number.is_empty() || supplier.is_empty() {
            return Err(StoreError::Invalid(
                "Preencha Nº Processo, Fornecedor e Modalidade!".to_string(),
            ));
        }
        let category_other = if category == PaymentCategory::Other {
            let text = draft.category_other.trim();
            if text.is_empty() {
                return Err(StoreError::Invalid("Especifique a modalidade!".to_string()));
            }
            Some(text.to_string())
        } else {
            None
        };
        let description = Some(draft.description.trim().to_string());
        let documents = Some(draft.documents);

        match draft.id {
            Some(id) => {
                let Some(process) = self.data.processes.iter_mut().find(|p| p.id == id) else {
                    return Err(StoreError::Invalid(PROCESS_NOT_FOUND.to_string()));
                };
                process.supplier = supplier.clone();
                process.payment_type = category;
                process.payment_type_other = category_other;
                process.description = description;
                process.documents = documents;
                let number = process.process_number.clone();
                record_activity(
                    &mut self.data,
                    &user,
                    "Atualização de Processo",
                    format!("Processo Nº {number} atualizado."),
                    json!({ "supplier": supplier }),
                );
                info!("process {number} updated");
            }
            None => {
                if self.data.processes.iter().any(|p| p.process_number == number) {
                    return Err(StoreError::Invalid(
                        "Já existe um processo com este número.".to_string(),
                    ));
                }
                self.data.processes.push(Process {
                    id: generate_record_id(),
                    process_number: number.clone(),
                    supplier: supplier.clone(),
                    payment_type: category,
                    payment_type_other: category_other,
                    description,
                    documents,
                    location_info: Some(ProcessLocation::Accounting),
                    location_other_text: None,
                    is_important: Some(false),
                    alert: None,
                    created_at: Some(now_timestamp()),
                });
                record_activity(
                    &mut self.data,
                    &user,
                    "Criação de Processo",
                    format!("Novo processo Nº {number} criado."),
                    json!({ "supplier": supplier }),
                );
                info!("process {number} created");
            }
        }
        self.sync().await
    }

    /// Update a process's free-text description. Saving the text it
    /// already has is a no-op that skips the round trip.
    pub async fn update_process_description(
        &mut self,
        process_id: &str,
        description: &str,
    ) -> Result<(), StoreError> {
        self.require_session()?;
        let user = self.acting_user();
        let Some(process) = self.data.processes.iter_mut().find(|p| p.id == process_id) else {
            return Err(StoreError::Invalid(PROCESS_NOT_FOUND.to_string()));
        };
        if process.description.as_deref() == Some(description) {
            return Ok(());
        }

        process.description = Some(description.to_string());
        let number = process.process_number.clone();
        let supplier = process.supplier.clone();
        record_activity(
            &mut self.data,
            &user,
            "Atualização de Processo",
            format!("Descrição do processo Nº {number} atualizada."),
            json!({ "supplier": supplier }),
        );
        self.sync().await
    }

    /// Set the importance flag and the optional alert on a process. An
    /// alert needs both its date and a non-blank message; `None` clears
    /// it. Writes no activity entry.
    pub async fn set_importance_and_alert(
        &mut self,
        process_id: &str,
        is_important: bool,
        alert: Option<ProcessAlert>,
    ) -> Result<(), StoreError> {
        self.require_session()?;
        let alert = match alert {
            Some(alert) => {
                let message = alert.message.trim().to_string();
                if alert.date.is_empty() || message.is_empty() {
                    return Err(StoreError::Invalid(
                        "Para criar um alerta, a data e a mensagem são obrigatórias.".to_string(),
                    ));
                }
                Some(ProcessAlert {
                    date: alert.date,
                    message,
                })
            }
            None => None,
        };
        let Some(process) = self.data.processes.iter_mut().find(|p| p.id == process_id) else {
            return Err(StoreError::Invalid(PROCESS_NOT_FOUND.to_string()));
        };

        process.is_important = Some(is_important);
        process.alert = alert;
        self.sync().await
    }

    /// Move a process's folder to a new location. The denormalized copy
    /// on every payment of the same process number moves with it.
    /// `other_text` is kept only for the free-form location.
    pub async fn set_process_location(
        &mut self,
        process_id: &str,
        location: ProcessLocation,
        other_text: &str,
    ) -> Result<(), StoreError> {
        self.require_session()?;
        let user = self.acting_user();
        let Some(process) = self.data.processes.iter_mut().find(|p| p.id == process_id) else {
            return Err(StoreError::Invalid(PROCESS_NOT_FOUND.to_string()));
        };

        process.location_info = Some(location);
        process.location_other_text = Some(if location == ProcessLocation::Other {
            other_text.trim().to_string()
        } else {
            String::new()
        });
        let number = process.process_number.clone();
        let supplier = process.supplier.clone();
        for payment in &mut self.data.payments {
            if payment.process_number == number {
                payment.location = Some(location);
            }
        }
        record_activity(
            &mut self.data,
            &user,
            "Mudança de Localização",
            format!("Localização do Proc. Nº {number} alterada para \"{location}\"."),
            json!({ "supplier": supplier }),
        );
        self.sync().await
    }

    /// Create or update a payment from its form draft. A payment must
    /// reference an existing process and always carries a fresh copy of
    /// that process's location.
    pub async fn save_payment(&mut self, draft: PaymentDraft) -> Result<(), StoreError> {
        self.require_session()?;
        let user = self.acting_user();

        let number = draft.process_number.trim().to_string();
        let supplier = draft.supplier.trim().to_string();
        // Non-finite amounts cannot round-trip the wire: serde_json
        // encodes them as null and the server rejects the snapshot.
        let value = draft.value.filter(|v| v.is_finite());
        let (Some(value), Some(status)) = (value, draft.status) else {
            return Err(StoreError::Invalid(
                "Preencha todos os campos obrigatórios!".to_string(),
            ));
        };
        if number.is_empty()
            || supplier.is_empty()
            || draft.payment_date.is_empty()
            || draft.method.is_empty()
        {
            return Err(StoreError::Invalid(
                "Preencha todos os campos obrigatórios!".to_string(),
            ));
        }
        let Some(process) = self.data.processes.iter().find(|p| p.process_number == number)
        else {
            return Err(StoreError::Invalid(
                "Nº de Processo não encontrado. Cadastre o processo primeiro.".to_string(),
            ));
        };
        let location = process.location_info.unwrap_or(ProcessLocation::Accounting);
        let method_other = if draft.method == "Outros" {
            let text = draft.method_other.trim();
            if text.is_empty() {
                return Err(StoreError::Invalid(
                    "Especifique o método de pagamento!".to_string(),
                ));
            }
            Some(text.to_string())
        } else {
            None
        };
        let description = Some(draft.description.trim().to_string());

        match draft.id {
            Some(id) => {
                let Some(payment) = self.data.payments.iter_mut().find(|p| p.id == id) else {
                    return Err(StoreError::Invalid(PAYMENT_NOT_FOUND.to_string()));
                };
                payment.process_number = number.clone();
                payment.supplier = supplier.clone();
                payment.value = value;
                payment.payment_date = Some(draft.payment_date);
                payment.payment_method = Some(draft.method);
                payment.payment_method_other = method_other;
                payment.status = status;
                payment.description = description;
                payment.payment_proof = draft.proof;
                payment.location = Some(location);
                record_activity(
                    &mut self.data,
                    &user,
                    "Atualização de Pagamento",
                    format!("Pagamento do processo Nº {number} atualizado."),
                    json!({ "supplier": supplier }),
                );
            }
            None => {
                self.data.payments.push(Payment {
                    id: generate_record_id(),
                    process_number: number.clone(),
                    supplier: supplier.clone(),
                    value,
                    payment_date: Some(draft.payment_date),
                    payment_method: Some(draft.method),
                    payment_method_other: method_other,
                    status,
                    description,
                    payment_proof: draft.proof,
                    location: Some(location),
                    created_at: Some(now_timestamp()),
                });
                record_activity(
                    &mut self.data,
                    &user,
                    "Criação de Pagamento",
                    format!("Novo pagamento de R$ {value:.2} para o processo Nº {number}."),
                    json!({ "supplier": supplier }),
                );
            }
        }
        self.sync().await
    }

    /// Change a payment's settlement status. Picking the value it
    /// already has is a no-op that skips the round trip.
    pub async fn set_payment_status(
        &mut self,
        payment_id: &str,
        status: PaymentStatus,
    ) -> Result<(), StoreError> {
        self.require_session()?;
        let user = self.acting_user();
        let Some(payment) = self.data.payments.iter_mut().find(|p| p.id == payment_id) else {
            return Err(StoreError::Invalid(PAYMENT_NOT_FOUND.to_string()));
        };
        if payment.status == status {
            return Ok(());
        }

        payment.status = status;
        let number = payment.process_number.clone();
        let supplier = payment.supplier.clone();
        record_activity(
            &mut self.data,
            &user,
            &format!("Status: {status}"),
            format!("Status do Pagto. Nº {number} alterado para '{status}'."),
            json!({ "supplier": supplier }),
        );
        self.sync().await
    }

    /// Delete a process and every payment referencing its number. The
    /// cascade lives here, in the caller; the gateway stores whatever
    /// snapshot it is given.
    pub async fn delete_process(&mut self, process_id: &str) -> Result<(), StoreError> {
        self.require_session()?;
        let user = self.acting_user();
        let Some(process) = self.data.processes.iter().find(|p| p.id == process_id) else {
            return Err(StoreError::Invalid(PROCESS_NOT_FOUND.to_string()));
        };

        let number = process.process_number.clone();
        let supplier = process.supplier.clone();
        let payments_before = self.data.payments.len();
        self.data.payments.retain(|p| p.process_number != number);
        self.data.processes.retain(|p| p.id != process_id);
        info!(
            "process {number} deleted along with {} payments",
            payments_before - self.data.payments.len()
        );
        record_activity(
            &mut self.data,
            &user,
            "Exclusão",
            format!("Processo Nº {number} e pagamentos associados foram excluídos."),
            json!({ "supplier": supplier }),
        );
        self.sync().await
    }

    /// Delete a single payment.
    pub async fn delete_payment(&mut self, payment_id: &str) -> Result<(), StoreError> {
        self.require_session()?;
        let user = self.acting_user();
        let Some(payment) = self.data.payments.iter().find(|p| p.id == payment_id) else {
            return Err(StoreError::Invalid(PAYMENT_NOT_FOUND.to_string()));
        };

        let number = payment.process_number.clone();
        let supplier = payment.supplier.clone();
        let value = payment.value;
        self.data.payments.retain(|p| p.id != payment_id);
        record_activity(
            &mut self.data,
            &user,
            "Exclusão",
            format!("Pagamento de R$ {value:.2} (Proc. Nº {number}) foi excluído."),
            json!({ "supplier": supplier }),
        );
        self.sync().await
    }

    /// Remove an account (admin only). Deleting the account behind the
    /// current session is refused.
    pub async fn delete_user(&mut self, username: &str) -> Result<(), StoreError> {
        let actor = self.authorize(Capability::ManageUsers)?;
        if actor == username {
            return Err(StoreError::Invalid(
                "Você não pode excluir sua própria conta.".to_string(),
            ));
        }
        if !self.data.users.iter().any(|u| u.username == username) {
            return Err(StoreError::Invalid(USER_NOT_FOUND.to_string()));
        }

        self.data.users.retain(|u| u.username != username);
        record_activity(
            &mut self.data,
            &actor,
            "Exclusão de Usuário",
            format!("O usuário \"{username}\" foi excluído."),
            json!({}),
        );
        self.sync().await
    }

    /// Truncate the activity log (admin only): everything, or just the
    /// given entry ids. Writes no entry of its own.
    pub async fn clear_activities(&mut self, ids: Option<&[String]>) -> Result<(), StoreError> {
        self.authorize(Capability::ClearActivityLog)?;
        match ids {
            None => self.data.activities.clear(),
            Some(ids) => self.data.activities.retain(|act| !ids.contains(&act.id)),
        }
        info!("activity log cleared ({} entries remain)", self.data.activities.len());
        self.sync().await
    }

    fn require_session(&self) -> Result<String, StoreError> {
        self.session.clone().ok_or(StoreError::NotAuthenticated)
    }

    /// Username of the session, checked to exist and to hold
    /// `capability`.
    fn authorize(&self, capability: Capability) -> Result<String, StoreError> {
        let account = self.current_account().ok_or(StoreError::NotAuthenticated)?;
        if policy::allows(account, capability) {
            Ok(account.username.clone())
        } else {
            Err(StoreError::Forbidden)
        }
    }

    fn acting_user(&self) -> String {
        self.session.clone().unwrap_or_else(|| "Sistema".to_string())
    }

    /// Save then reload, the write path every entity mutation uses.
    async fn sync(&mut self) -> Result<(), StoreError> {
        self.save().await?;
        self.load().await
    }
}

/// Prepend an activity entry, keeping the log reverse-chronological by
/// construction.
fn record_activity(
    snapshot: &mut Snapshot,
    user: &str,
    kind: &str,
    description: String,
    details: serde_json::Value,
) {
    snapshot.activities.insert(
        0,
        Activity {
            id: generate_record_id(),
            kind: kind.to_string(),
            description,
            user: user.to_string(),
            timestamp: now_timestamp(),
            details: Some(details),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_snapshot, FakeGateway};

    async fn setup() -> (ClientStore<FakeGateway>, FakeGateway) {
        let gateway = FakeGateway::new(sample_snapshot());
        let handle = gateway.clone();
        let mut store = ClientStore::new(gateway);
        store.load().await.expect("seed load");
        (store, handle)
    }

    async fn setup_admin() -> (ClientStore<FakeGateway>, FakeGateway) {
        let (mut store, handle) = setup().await;
        store.login("maria", "segredo").await.expect("admin login");
        (store, handle)
    }

    fn process_draft() -> ProcessDraft {
        ProcessDraft {
            id: None,
            process_number: "2024/100".to_string(),
            supplier: "Gama Transportes".to_string(),
            category: Some(PaymentCategory::ElectronicAuction),
            category_other: String::new(),
            description: "Frete".to_string(),
            documents: vec![],
        }
    }

    fn payment_draft() -> PaymentDraft {
        PaymentDraft {
            id: None,
            process_number: "2024/001".to_string(),
            supplier: "Acme Serviços".to_string(),
            value: Some(150.0),
            payment_date: "2024-04-01".to_string(),
            method: "Transferência".to_string(),
            method_other: String::new(),
            status: Some(PaymentStatus::PendingSettlement),
            description: String::new(),
            proof: None,
        }
    }

    fn message(err: StoreError) -> String {
        err.to_string()
    }

    #[tokio::test]
    async fn test_login_requires_valid_credentials() {
        let (mut store, _handle) = setup().await;

        let err = store.login("maria", "errada").await.expect_err("bad password");
        assert_eq!(message(err), "Usuário ou senha inválidos.");
        assert_eq!(store.session(), None);

        store.login("maria", "segredo").await.expect("valid login");
        assert_eq!(store.session(), Some("maria"));

        let entry = &store.activities()[0];
        assert_eq!(entry.kind, "Login");
        assert_eq!(entry.user, "maria");
        assert_eq!(entry.description, "Usuário maria fez login.");
    }

    #[tokio::test]
    async fn test_login_persists_without_reloading() {
        let (mut store, handle) = setup().await;
        let writes_before = handle.write_calls();

        store.login("joao", "1234").await.expect("login");

        // One write, no follow-up load: the local entry is the same
        // object the server received.
        assert_eq!(handle.write_calls(), writes_before + 1);
        assert_eq!(handle.stored().activities.len(), 1);
        assert_eq!(handle.stored().activities[0].kind, "Login");
    }

    #[tokio::test]
    async fn test_mutations_require_a_session() {
        let (mut store, _handle) = setup().await;

        let err = store.save_process(process_draft()).await.expect_err("no session");
        assert!(matches!(err, StoreError::NotAuthenticated));

        let err = store.delete_process("a1").await.expect_err("no session");
        assert!(matches!(err, StoreError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_logout_clears_session_and_logs() {
        let (mut store, handle) = setup_admin().await;

        store.logout().await.expect("logout");
        assert_eq!(store.session(), None);
        assert_eq!(handle.stored().activities[0].kind, "Logout");
        assert_eq!(
            handle.stored().activities[0].description,
            "Usuário maria fez logout."
        );
    }

    #[tokio::test]
    async fn test_register_bootstraps_the_first_admin() {
        let gateway = FakeGateway::new(shared::Snapshot::default());
        let handle = gateway.clone();
        let mut store = ClientStore::new(gateway);
        store.load().await.expect("load empty");

        store.register("ana", "valente").await.expect("bootstrap");
        assert_eq!(handle.stored().users[0].role, Some(Role::Admin));

        // With users present, registration needs an admin session.
        let err = store.register("bia", "outra").await.expect_err("no session");
        assert!(matches!(err, StoreError::NotAuthenticated));

        store.login("ana", "valente").await.expect("login");
        store.register("bia", "outra").await.expect("admin registers");
        assert_eq!(handle.stored().users[1].role, None);

        let err = store.register("bia", "outra").await.expect_err("duplicate");
        assert_eq!(message(err), "Este nome de usuário já existe.");
    }

    #[tokio::test]
    async fn test_register_rejects_blank_fields_and_members() {
        let (mut store, _handle) = setup().await;

        let err = store.register("", "senha").await.expect_err("blank username");
        assert_eq!(message(err), "Preencha o nome de usuário e a senha.");

        store.login("joao", "1234").await.expect("member login");
        let err = store.register("carla", "nova").await.expect_err("member");
        assert!(matches!(err, StoreError::Forbidden));
    }

    #[tokio::test]
    async fn test_change_password_validations() {
        let (mut store, handle) = setup().await;
        store.login("joao", "1234").await.expect("login");

        let err = store
            .change_password("1234", "nova1", "nova2")
            .await
            .expect_err("mismatch");
        assert_eq!(message(err), "As novas senhas não coincidem.");

        let err = store
            .change_password("1234", "abc", "abc")
            .await
            .expect_err("too short");
        assert_eq!(message(err), "A nova senha deve ter pelo menos 4 caracteres.");

        let err = store
            .change_password("errada", "nova1", "nova1")
            .await
            .expect_err("wrong current");
        assert_eq!(message(err), "A senha atual está incorreta.");

        store
            .change_password("1234", "nova1", "nova1")
            .await
            .expect("valid change");
        let stored = handle.stored();
        let joao = stored.users.iter().find(|u| u.username == "joao").expect("joao");
        assert_eq!(joao.password, "nova1");
        assert_eq!(stored.activities[0].kind, "Alteração de Senha");
        assert_eq!(
            stored.activities[0].description,
            "O usuário joao alterou a própria senha."
        );
    }

    #[tokio::test]
    async fn test_change_password_reverts_when_save_fails() {
        let (mut store, handle) = setup().await;
        store.login("joao", "1234").await.expect("login");
        handle.fail_writes(1);

        let err = store
            .change_password("1234", "nova1", "nova1")
            .await
            .expect_err("write fails");
        assert!(err.is_transient());

        let local = store.users().iter().find(|u| u.username == "joao").expect("joao");
        assert_eq!(local.password, "1234", "local password reverted");
        let stored = handle.stored();
        let remote = stored.users.iter().find(|u| u.username == "joao").expect("joao");
        assert_eq!(remote.password, "1234");
    }

    #[tokio::test]
    async fn test_save_process_creates_with_defaults() {
        let (mut store, handle) = setup_admin().await;

        store.save_process(process_draft()).await.expect("create");

        let stored = handle.stored();
        let process = stored
            .processes
            .iter()
            .find(|p| p.process_number == "2024/100")
            .expect("created process");
        assert_eq!(process.supplier, "Gama Transportes");
        assert_eq!(process.location_info, Some(ProcessLocation::Accounting));
        assert_eq!(process.is_important, Some(false));
        assert_eq!(process.alert, None);
        assert_eq!(process.documents, Some(vec![]));
        assert_eq!(process.description.as_deref(), Some("Frete"));
        assert!(process.created_at.as_deref().is_some_and(|t| t.ends_with('Z')));

        let entry = &store.activities()[0];
        assert_eq!(entry.kind, "Criação de Processo");
        assert_eq!(entry.description, "Novo processo Nº 2024/100 criado.");
        assert_eq!(entry.details, Some(json!({ "supplier": "Gama Transportes" })));
    }

    #[tokio::test]
    async fn test_save_process_validations() {
        let (mut store, _handle) = setup_admin().await;

        let mut draft = process_draft();
        draft.category = None;
        let err = store.save_process(draft).await.expect_err("no category");
        assert_eq!(message(err), "Preencha Nº Processo, Fornecedor e Modalidade!");

        let mut draft = process_draft();
        draft.supplier = "   ".to_string();
        let err = store.save_process(draft).await.expect_err("blank supplier");
        assert_eq!(message(err), "Preencha Nº Processo, Fornecedor e Modalidade!");

        let mut draft = process_draft();
        draft.category = Some(PaymentCategory::Other);
        let err = store.save_process(draft).await.expect_err("missing detail");
        assert_eq!(message(err), "Especifique a modalidade!");

        let mut draft = process_draft();
        draft.process_number = "2024/001".to_string();
        let err = store.save_process(draft).await.expect_err("duplicate number");
        assert_eq!(message(err), "Já existe um processo com este número.");
    }

    #[tokio::test]
    async fn test_process_edit_keeps_number_importance_and_alert() {
        let (mut store, handle) = setup_admin().await;

        let draft = ProcessDraft {
            id: Some("a1".to_string()),
            process_number: "9999/999".to_string(), // ignored on edit
            supplier: "Acme Renovada".to_string(),
            category: Some(PaymentCategory::Advance),
            category_other: String::new(),
            description: "Revisado".to_string(),
            documents: vec![],
        };
        store.save_process(draft).await.expect("edit");

        let stored = handle.stored();
        let process = stored.processes.iter().find(|p| p.id == "a1").expect("a1");
        assert_eq!(process.process_number, "2024/001", "number never changes");
        assert_eq!(process.supplier, "Acme Renovada");
        assert_eq!(process.payment_type, PaymentCategory::Advance);
        assert_eq!(process.is_important, Some(true), "importance preserved");
        assert_eq!(stored.activities[0].kind, "Atualização de Processo");
        assert_eq!(
            stored.activities[0].description,
            "Processo Nº 2024/001 atualizado."
        );
    }

    #[tokio::test]
    async fn test_update_description_skips_when_unchanged() {
        let (mut store, handle) = setup_admin().await;
        let writes_before = handle.write_calls();

        store
            .update_process_description("a1", "Material de escritório")
            .await
            .expect("no-op");
        assert_eq!(handle.write_calls(), writes_before, "no round trip");

        store
            .update_process_description("a1", "Material de expediente")
            .await
            .expect("changed");
        let stored = handle.stored();
        let process = stored.processes.iter().find(|p| p.id == "a1").expect("a1");
        assert_eq!(process.description.as_deref(), Some("Material de expediente"));
        assert_eq!(
            stored.activities[0].description,
            "Descrição do processo Nº 2024/001 atualizada."
        );
    }

    #[tokio::test]
    async fn test_importance_and_alert_rules() {
        let (mut store, handle) = setup_admin().await;

        let err = store
            .set_importance_and_alert(
                "a1",
                true,
                Some(ProcessAlert {
                    date: "2024-05-01".to_string(),
                    message: "   ".to_string(),
                }),
            )
            .await
            .expect_err("blank message");
        assert_eq!(
            message(err),
            "Para criar um alerta, a data e a mensagem são obrigatórias."
        );

        let activities_before = store.activities().len();
        store
            .set_importance_and_alert(
                "a2",
                true,
                Some(ProcessAlert {
                    date: "2024-05-01".to_string(),
                    message: " Conferir empenho ".to_string(),
                }),
            )
            .await
            .expect("valid alert");

        let stored = handle.stored();
        let process = stored.processes.iter().find(|p| p.id == "a2").expect("a2");
        assert_eq!(process.is_important, Some(true));
        assert_eq!(
            process.alert,
            Some(ProcessAlert {
                date: "2024-05-01".to_string(),
                message: "Conferir empenho".to_string(),
            })
        );
        assert_eq!(store.activities().len(), activities_before, "no entry written");

        store
            .set_importance_and_alert("a2", false, None)
            .await
            .expect("clear alert");
        let stored = handle.stored();
        let process = stored.processes.iter().find(|p| p.id == "a2").expect("a2");
        assert_eq!(process.is_important, Some(false));
        assert_eq!(process.alert, None);
    }

    #[tokio::test]
    async fn test_set_process_location_propagates_to_payments() {
        let (mut store, handle) = setup_admin().await;

        store
            .set_process_location("a1", ProcessLocation::Archived, "")
            .await
            .expect("move folder");

        let stored = handle.stored();
        let process = stored.processes.iter().find(|p| p.id == "a1").expect("a1");
        assert_eq!(process.location_info, Some(ProcessLocation::Archived));
        assert_eq!(process.location_other_text.as_deref(), Some(""));
        for payment in &stored.payments {
            assert_eq!(payment.location, Some(ProcessLocation::Archived));
        }
        assert_eq!(stored.activities[0].kind, "Mudança de Localização");
        assert_eq!(
            stored.activities[0].description,
            "Localização do Proc. Nº 2024/001 alterada para \"Arquivado\"."
        );

        store
            .set_process_location("a1", ProcessLocation::Other, " 3º andar ")
            .await
            .expect("free-form location");
        let stored = handle.stored();
        let process = stored.processes.iter().find(|p| p.id == "a1").expect("a1");
        assert_eq!(process.location_other_text.as_deref(), Some("3º andar"));
    }

    #[tokio::test]
    async fn test_other_location_text_may_be_blank() {
        let (mut store, handle) = setup_admin().await;

        store
            .set_process_location("a1", ProcessLocation::Other, "   ")
            .await
            .expect("blank free text");

        let stored = handle.stored();
        let process = stored.processes.iter().find(|p| p.id == "a1").expect("a1");
        assert_eq!(process.location_info, Some(ProcessLocation::Other));
        assert_eq!(process.location_other_text.as_deref(), Some(""));

        store
            .set_process_location("a1", ProcessLocation::Accounting, "sala 2")
            .await
            .expect("named folder");
        let stored = handle.stored();
        let process = stored.processes.iter().find(|p| p.id == "a1").expect("a1");
        assert_eq!(process.location_info, Some(ProcessLocation::Accounting));
        assert_eq!(process.location_other_text.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_save_payment_copies_location_and_logs() {
        let (mut store, handle) = setup_admin().await;

        store.save_payment(payment_draft()).await.expect("create");

        let stored = handle.stored();
        let payment = stored
            .payments
            .iter()
            .find(|p| p.value == 150.0)
            .expect("created payment");
        assert_eq!(payment.location, Some(ProcessLocation::Accounting));
        assert!(payment.created_at.is_some());
        assert_eq!(stored.activities[0].kind, "Criação de Pagamento");
        assert_eq!(
            stored.activities[0].description,
            "Novo pagamento de R$ 150.00 para o processo Nº 2024/001."
        );
    }

    #[tokio::test]
    async fn test_save_payment_validations() {
        let (mut store, _handle) = setup_admin().await;

        let mut draft = payment_draft();
        draft.value = None;
        let err = store.save_payment(draft).await.expect_err("missing value");
        assert_eq!(message(err), "Preencha todos os campos obrigatórios!");

        let mut draft = payment_draft();
        draft.payment_date = String::new();
        let err = store.save_payment(draft).await.expect_err("missing date");
        assert_eq!(message(err), "Preencha todos os campos obrigatórios!");

        let mut draft = payment_draft();
        draft.process_number = "2099/999".to_string();
        let err = store.save_payment(draft).await.expect_err("unknown process");
        assert_eq!(
            message(err),
            "Nº de Processo não encontrado. Cadastre o processo primeiro."
        );

        let mut draft = payment_draft();
        draft.method = "Outros".to_string();
        let err = store.save_payment(draft).await.expect_err("missing method text");
        assert_eq!(message(err), "Especifique o método de pagamento!");
    }

    #[tokio::test]
    async fn test_save_payment_rejects_nonfinite_amounts() {
        let (mut store, handle) = setup_admin().await;
        let writes_before = handle.write_calls();

        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut draft = payment_draft();
            draft.value = Some(value);
            let err = store
                .save_payment(draft)
                .await
                .expect_err("non-finite amount");
            assert_eq!(message(err), "Preencha todos os campos obrigatórios!");
        }

        assert_eq!(handle.write_calls(), writes_before);
        assert!(store.payments().iter().all(|p| p.value.is_finite()));
    }

    #[tokio::test]
    async fn test_set_payment_status_is_noop_when_unchanged() {
        let (mut store, handle) = setup_admin().await;
        let writes_before = handle.write_calls();

        store
            .set_payment_status("b2", PaymentStatus::Scheduled)
            .await
            .expect("same status");
        assert_eq!(handle.write_calls(), writes_before);

        store
            .set_payment_status("b2", PaymentStatus::Paid)
            .await
            .expect("status change");
        let stored = handle.stored();
        let payment = stored.payments.iter().find(|p| p.id == "b2").expect("b2");
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(stored.activities[0].kind, "Status: Pago");
        assert_eq!(
            stored.activities[0].description,
            "Status do Pagto. Nº 2024/001 alterado para 'Pago'."
        );
    }

    #[tokio::test]
    async fn test_delete_process_cascades_its_payments() {
        let (mut store, handle) = setup_admin().await;

        store.delete_process("a1").await.expect("delete");

        let stored = handle.stored();
        assert_eq!(stored.processes.len(), 1);
        assert!(
            stored.payments.is_empty(),
            "both payments referenced 2024/001"
        );
        assert_eq!(stored.activities[0].kind, "Exclusão");
        assert_eq!(
            stored.activities[0].description,
            "Processo Nº 2024/001 e pagamentos associados foram excluídos."
        );
        assert_eq!(store.processes().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_payment() {
        let (mut store, handle) = setup_admin().await;

        store.delete_payment("b2").await.expect("delete");

        let stored = handle.stored();
        assert_eq!(stored.payments.len(), 1);
        assert_eq!(
            stored.activities[0].description,
            "Pagamento de R$ 250.50 (Proc. Nº 2024/001) foi excluído."
        );

        let err = store.delete_payment("b2").await.expect_err("already gone");
        assert_eq!(message(err), "Pagamento não encontrado.");
    }

    #[tokio::test]
    async fn test_user_management_needs_the_capability() {
        let (mut store, _handle) = setup().await;
        store.login("joao", "1234").await.expect("member login");

        let err = store.add_user("carla", "senha").await.expect_err("member");
        assert!(matches!(err, StoreError::Forbidden));
        let err = store.delete_user("maria").await.expect_err("member");
        assert!(matches!(err, StoreError::Forbidden));
        let err = store.clear_activities(None).await.expect_err("member");
        assert!(matches!(err, StoreError::Forbidden));
    }

    #[tokio::test]
    async fn test_admin_user_management() {
        let (mut store, handle) = setup_admin().await;

        store.add_user(" carla ", "senha").await.expect("add");
        let stored = handle.stored();
        let carla = stored.users.iter().find(|u| u.username == "carla").expect("carla");
        assert_eq!(carla.role, None);
        assert_eq!(stored.activities[0].kind, "Criação de Usuário");
        assert_eq!(
            stored.activities[0].description,
            "Novo usuário \"carla\" foi criado."
        );

        let err = store.delete_user("maria").await.expect_err("own account");
        assert_eq!(message(err), "Você não pode excluir sua própria conta.");

        let err = store.delete_user("ninguem").await.expect_err("unknown");
        assert_eq!(message(err), "Usuário não encontrado.");

        store.delete_user("carla").await.expect("delete");
        let stored = handle.stored();
        assert!(!stored.users.iter().any(|u| u.username == "carla"));
        assert_eq!(stored.activities[0].kind, "Exclusão de Usuário");
        assert_eq!(
            stored.activities[0].description,
            "O usuário \"carla\" foi excluído."
        );
    }

    #[tokio::test]
    async fn test_clear_activities_all_or_subset() {
        let (mut store, handle) = setup_admin().await;
        store
            .set_payment_status("b1", PaymentStatus::RegisteredAtBank)
            .await
            .expect("make an entry");
        store
            .set_payment_status("b1", PaymentStatus::Paid)
            .await
            .expect("make another");
        assert_eq!(store.activities().len(), 3); // login + two changes

        let newest = store.activities()[0].id.clone();
        store
            .clear_activities(Some(&[newest.clone()]))
            .await
            .expect("subset clear");
        assert_eq!(store.activities().len(), 2);
        assert!(store.activities().iter().all(|a| a.id != newest));

        store.clear_activities(None).await.expect("full clear");
        assert!(store.activities().is_empty());
        assert!(handle.stored().activities.is_empty());
    }
}
