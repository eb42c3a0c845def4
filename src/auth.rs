//! Authentication collaborator. The chat core only ever consumes a
//! stable uid and a display name from it; everything else (credential
//! storage, federated popups) belongs to the provider behind the trait.

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::Engine;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::info;

use crate::scope::{Principal, UserScope};

/// The two federated providers the login screen offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OauthProvider {
    Google,
    Github,
}

#[async_trait]
pub trait AuthClient: Send + Sync {
    /// The scope as of now.
    fn current(&self) -> UserScope;
    /// Push-based auth state changes; the receiver sees every sign-in
    /// and sign-out until it is dropped.
    fn subscribe(&self) -> watch::Receiver<UserScope>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal>;
    async fn register(&self, name: &str, email: &str, password: &str) -> Result<Principal>;
    async fn sign_in_with_provider(&self, provider: OauthProvider) -> Result<Principal>;
    async fn sign_out(&self);
}

struct Account {
    uid: String,
    name: String,
    password_digest: String,
}

/// In-process provider standing in for the hosted auth service. Failure
/// messages are surfaced raw to the caller, the way the login screen
/// shows them.
pub struct LocalAuth {
    accounts: Mutex<HashMap<String, Account>>,
    state: watch::Sender<UserScope>,
}

impl LocalAuth {
    pub fn new() -> Self {
        let (state, _) = watch::channel(UserScope::Guest);
        Self {
            accounts: Mutex::new(HashMap::new()),
            state,
        }
    }

    /// Start out already signed in; used when identity comes from the
    /// environment rather than an interactive flow.
    pub fn signed_in(principal: Principal) -> Self {
        let auth = Self::new();
        auth.state.send_replace(UserScope::User(principal));
        auth
    }

    fn digest(password: &str) -> String {
        let hash = Sha1::digest(password.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(hash)
    }
}

impl Default for LocalAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthClient for LocalAuth {
    fn current(&self) -> UserScope {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<UserScope> {
        self.state.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal> {
        let accounts = self.accounts.lock().unwrap();
        let Some(account) = accounts.get(email) else {
            bail!("No account exists for {email}");
        };
        if account.password_digest != Self::digest(password) {
            bail!("Invalid password for {email}");
        }
        let principal = Principal::new(&account.uid, &account.name);
        drop(accounts);

        info!(email, "signed in");
        self.state.send_replace(UserScope::User(principal.clone()));
        Ok(principal)
    }

    async fn register(&self, name: &str, email: &str, password: &str) -> Result<Principal> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            bail!("An account already exists for {email}");
        }
        let uid = uuid::Uuid::new_v4().simple().to_string();
        accounts.insert(
            email.to_string(),
            Account {
                uid: uid.clone(),
                name: name.to_string(),
                password_digest: Self::digest(password),
            },
        );
        drop(accounts);

        let principal = Principal::new(uid, name);
        info!(email, "registered");
        self.state.send_replace(UserScope::User(principal.clone()));
        Ok(principal)
    }

    async fn sign_in_with_provider(&self, provider: OauthProvider) -> Result<Principal> {
        // No popup here; the stand-in resolves each provider to a fixed
        // principal so downstream paths stay exercisable.
        let principal = match provider {
            OauthProvider::Google => Principal::new("google-user", "Google User"),
            OauthProvider::Github => Principal::new("github-user", "GitHub User"),
        };
        self.state.send_replace(UserScope::User(principal.clone()));
        Ok(principal)
    }

    async fn sign_out(&self) {
        self.state.send_replace(UserScope::Guest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_sign_in_round_trips() {
        let auth = LocalAuth::new();
        let registered = auth.register("Omma", "o@example.com", "pw").await.unwrap();
        auth.sign_out().await;

        let signed_in = auth.sign_in("o@example.com", "pw").await.unwrap();
        assert_eq!(signed_in, registered);
        assert_eq!(auth.current(), UserScope::User(signed_in));
    }

    #[tokio::test]
    async fn failures_carry_their_raw_message() {
        let auth = LocalAuth::new();
        auth.register("Omma", "o@example.com", "pw").await.unwrap();

        let err = auth.sign_in("o@example.com", "wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid password for o@example.com");

        let err = auth.sign_in("nobody@example.com", "pw").await.unwrap_err();
        assert_eq!(err.to_string(), "No account exists for nobody@example.com");

        let err = auth.register("Omma", "o@example.com", "pw").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "An account already exists for o@example.com"
        );
    }

    #[tokio::test]
    async fn state_changes_reach_subscribers() {
        let auth = LocalAuth::new();
        let mut rx = auth.subscribe();
        assert!(rx.borrow().is_guest());

        auth.register("Omma", "o@example.com", "pw").await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().display_name(), "Omma");

        auth.sign_out().await;
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_guest());
    }

    #[tokio::test]
    async fn provider_sign_in_yields_a_stable_principal() {
        let auth = LocalAuth::new();
        let first = auth
            .sign_in_with_provider(OauthProvider::Github)
            .await
            .unwrap();
        let second = auth
            .sign_in_with_provider(OauthProvider::Github)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.uid, "github-user");
    }
}
