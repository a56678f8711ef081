// ── Config flow ──
//
// The setup wizard: collects username, password and base URL, validates
// the URL shape locally and the credentials with a live login, then
// produces a config entry. A reauth step re-validates a new password for
// an existing entry.

use std::collections::BTreeMap;

use secrecy::SecretString;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use url::Url;

use hiklink_api::{ApiFactory, DEFAULT_BASE_URL, HikConnectApi};

use crate::config::ConfigEntry;
use crate::error::CoreError;

pub const STEP_USER: &str = "user";
pub const STEP_REAUTH: &str = "reauth_confirm";

pub const FIELD_USERNAME: &str = "username";
pub const FIELD_PASSWORD: &str = "password";
pub const FIELD_BASE_URL: &str = "base_url";
/// Key for errors not tied to one field.
pub const FIELD_BASE: &str = "base";

/// User-visible validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowError {
    LoginFailed,
    InvalidBaseUrl,
    Unknown,
}

impl FlowError {
    /// Translation key shown by the host UI.
    pub fn key(self) -> &'static str {
        match self {
            Self::LoginFailed => "login_failed",
            Self::InvalidBaseUrl => "invalid_base_url",
            Self::Unknown => "unknown",
        }
    }

    /// Form field the error is attached to.
    pub fn field(self) -> &'static str {
        match self {
            Self::InvalidBaseUrl => FIELD_BASE_URL,
            Self::LoginFailed | Self::Unknown => FIELD_BASE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    AlreadyConfigured,
}

/// One input of the form schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormField {
    pub name: &'static str,
    pub required: bool,
    pub secret: bool,
    pub default: Option<String>,
}

/// Values submitted in the user step.
#[derive(Debug, Clone)]
pub struct UserInput {
    pub username: String,
    pub password: SecretString,
    pub base_url: String,
}

#[derive(Debug)]
pub enum FlowResult {
    ShowForm {
        step_id: &'static str,
        schema: Vec<FormField>,
        errors: BTreeMap<&'static str, FlowError>,
    },
    CreateEntry {
        title: String,
        entry: ConfigEntry,
    },
    /// Reauth succeeded; persist and reload this entry.
    UpdateEntry {
        entry: ConfigEntry,
    },
    Abort {
        reason: AbortReason,
    },
}

fn user_schema() -> Vec<FormField> {
    vec![
        FormField {
            name: FIELD_USERNAME,
            required: true,
            secret: false,
            default: None,
        },
        FormField {
            name: FIELD_PASSWORD,
            required: true,
            secret: true,
            default: None,
        },
        FormField {
            name: FIELD_BASE_URL,
            required: true,
            secret: false,
            default: Some(DEFAULT_BASE_URL.to_owned()),
        },
    ]
}

fn reauth_schema() -> Vec<FormField> {
    vec![FormField {
        name: FIELD_PASSWORD,
        required: true,
        secret: true,
        default: None,
    }]
}

fn show_form(
    step_id: &'static str,
    schema: Vec<FormField>,
    error: Option<FlowError>,
) -> FlowResult {
    let errors = error.map(|e| (e.field(), e)).into_iter().collect();
    FlowResult::ShowForm {
        step_id,
        schema,
        errors,
    }
}

/// Accept only a bare `http(s)://host[:port]` origin.
pub fn validate_base_url(raw: &str) -> Result<Url, FlowError> {
    let url = Url::parse(raw.trim()).map_err(|_| FlowError::InvalidBaseUrl)?;
    let shape_ok = matches!(url.scheme(), "http" | "https")
        && url.host_str().is_some()
        && matches!(url.path(), "" | "/")
        && url.query().is_none()
        && url.fragment().is_none();
    if shape_ok {
        Ok(url)
    } else {
        Err(FlowError::InvalidBaseUrl)
    }
}

/// Drives the setup wizard against clients built by `factory`.
pub struct ConfigFlow<F: ApiFactory> {
    factory: F,
}

impl<F: ApiFactory> ConfigFlow<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    /// Log in and list devices once; the client is closed afterwards.
    async fn validate_credentials(
        &self,
        base_url: &Url,
        username: &str,
        password: &SecretString,
    ) -> Result<(), FlowError> {
        let api = self.factory.build(base_url).map_err(|e| {
            error!(error = %e, "could not create Hik-Connect client");
            FlowError::Unknown
        })?;

        let result = check_login(&api, username, password).await;
        if let Err(e) = api.close().await {
            debug!(error = %e, "closing validation client");
        }
        result
    }

    /// The `user` step. `None` renders the empty form.
    ///
    /// `existing` are the already configured entries, used to refuse a
    /// second entry for the same account.
    pub async fn step_user(&self, input: Option<UserInput>, existing: &[ConfigEntry]) -> FlowResult {
        let Some(input) = input else {
            return show_form(STEP_USER, user_schema(), None);
        };

        let base_url = match validate_base_url(&input.base_url) {
            Ok(url) => url,
            Err(e) => {
                debug!(base_url = %input.base_url, "rejected base URL");
                return show_form(STEP_USER, user_schema(), Some(e));
            }
        };

        if let Err(e) = self
            .validate_credentials(&base_url, &input.username, &input.password)
            .await
        {
            return show_form(STEP_USER, user_schema(), Some(e));
        }

        let unique_id = input.username.clone();
        if existing.iter().any(|entry| entry.unique_id == unique_id) {
            return FlowResult::Abort {
                reason: AbortReason::AlreadyConfigured,
            };
        }

        info!(%unique_id, "adding Hik-Connect config entry");
        let entry = ConfigEntry::new(&input.username, input.password, base_url);
        FlowResult::CreateEntry {
            title: entry.title.clone(),
            entry,
        }
    }

    /// The reauth step for `entry`. `None` renders the password form.
    pub async fn step_reauth(&self, entry: &ConfigEntry, password: Option<SecretString>) -> FlowResult {
        let Some(password) = password else {
            return show_form(STEP_REAUTH, reauth_schema(), None);
        };

        let base_url = match entry.base_url() {
            Ok(url) => url.clone(),
            Err(e) => {
                error!(error = %e, "entry has no usable base URL");
                return show_form(STEP_REAUTH, reauth_schema(), Some(FlowError::Unknown));
            }
        };

        if let Err(e) = self
            .validate_credentials(&base_url, &entry.data.username, &password)
            .await
        {
            return show_form(STEP_REAUTH, reauth_schema(), Some(e));
        }

        let mut updated = entry.clone();
        updated.data.password = password;
        info!(entry_id = %entry.entry_id, "reauthenticated Hik-Connect config entry");
        FlowResult::UpdateEntry { entry: updated }
    }
}

async fn check_login<A: HikConnectApi>(
    api: &A,
    username: &str,
    password: &SecretString,
) -> Result<(), FlowError> {
    if let Err(e) = api.login(username, password).await {
        let e = CoreError::from(e);
        if e.is_auth() {
            warn!(error = %e, "Hik-Connect login failed");
            return Err(FlowError::LoginFailed);
        }
        error!(error = %e, "unexpected error during login");
        return Err(FlowError::Unknown);
    }

    // Only checks that the API answers; devices are fetched again at setup.
    api.get_devices().await.map_err(|e| {
        error!(error = %e, "unexpected error listing devices");
        FlowError::Unknown
    })?;
    Ok(())
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use hiklink_api::Error;
    use hiklink_api::mock::{MockCall, MockHikConnect, MockOp};
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn flow(mock: &MockHikConnect) -> ConfigFlow<impl ApiFactory<Api = MockHikConnect>> {
        let mock = mock.clone();
        ConfigFlow::new(move |_: &Url| Ok::<_, Error>(mock.clone()))
    }

    fn input(password: &str, base_url: &str) -> UserInput {
        UserInput {
            username: "user@example.com".into(),
            password: SecretString::from(password),
            base_url: base_url.into(),
        }
    }

    fn form_errors(result: &FlowResult) -> BTreeMap<&'static str, FlowError> {
        match result {
            FlowResult::ShowForm { errors, .. } => errors.clone(),
            other => panic!("expected form, got {other:?}"),
        }
    }

    #[test]
    fn base_url_shapes() {
        assert!(validate_base_url("https://api.hik-connect.com").is_ok());
        assert!(validate_base_url("https://api.hik-connect.com/").is_ok());
        assert!(validate_base_url("http://192.168.1.10:8080").is_ok());

        for bad in [
            "ftp://api.hik-connect.com",
            "https://api.hik-connect.com/v3",
            "https://api.hik-connect.com?region=eu",
            "https://api.hik-connect.com/#top",
            "not a url",
            "",
        ] {
            assert_eq!(validate_base_url(bad), Err(FlowError::InvalidBaseUrl), "{bad}");
        }
    }

    #[tokio::test]
    async fn empty_input_shows_form_with_default_url() {
        let mock = MockHikConnect::new("user@example.com", "pw");
        let result = flow(&mock).step_user(None, &[]).await;

        let FlowResult::ShowForm { step_id, schema, errors } = result else {
            panic!("expected form");
        };
        assert_eq!(step_id, STEP_USER);
        assert!(errors.is_empty());
        let base_url = schema.iter().find(|f| f.name == FIELD_BASE_URL).unwrap();
        assert_eq!(base_url.default.as_deref(), Some(DEFAULT_BASE_URL));
    }

    #[tokio::test]
    async fn bad_base_url_is_rejected_without_login() {
        let mock = MockHikConnect::new("user@example.com", "pw");
        let result = flow(&mock)
            .step_user(Some(input("pw", "https://api.hik-connect.com/?x=1")), &[])
            .await;

        assert_eq!(
            form_errors(&result),
            BTreeMap::from([(FIELD_BASE_URL, FlowError::InvalidBaseUrl)])
        );
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn valid_input_creates_entry() {
        let mock = MockHikConnect::new("user@example.com", "pw");
        let result = flow(&mock)
            .step_user(Some(input("pw", "https://api.hik-connect.com")), &[])
            .await;

        let FlowResult::CreateEntry { title, entry } = result else {
            panic!("expected entry, got {result:?}");
        };
        assert_eq!(title, "user@example.com");
        assert_eq!(entry.unique_id, "user@example.com");
        assert_eq!(
            entry.base_url().unwrap().as_str(),
            "https://api.hik-connect.com/"
        );
        assert_eq!(
            mock.calls(),
            vec![
                MockCall::Login {
                    username: "user@example.com".into()
                },
                MockCall::GetDevices,
                MockCall::Close,
            ]
        );
    }

    #[tokio::test]
    async fn wrong_password_reports_login_failed() {
        let mock = MockHikConnect::new("user@example.com", "pw");
        let result = flow(&mock)
            .step_user(Some(input("wrong", "https://api.hik-connect.com")), &[])
            .await;

        assert_eq!(
            form_errors(&result),
            BTreeMap::from([(FIELD_BASE, FlowError::LoginFailed)])
        );
        assert!(mock.is_closed());
    }

    #[tokio::test]
    async fn unexpected_errors_report_unknown() {
        let mock = MockHikConnect::new("user@example.com", "pw");
        mock.fail(MockOp::GetDevices, Error::UnexpectedResponse {
            message: "missing deviceInfos".into(),
        });
        let result = flow(&mock)
            .step_user(Some(input("pw", "https://api.hik-connect.com")), &[])
            .await;

        assert_eq!(
            form_errors(&result),
            BTreeMap::from([(FIELD_BASE, FlowError::Unknown)])
        );
    }

    #[tokio::test]
    async fn second_entry_for_same_account_aborts() {
        let mock = MockHikConnect::new("user@example.com", "pw");
        let existing = ConfigEntry::new(
            "user@example.com",
            SecretString::from("pw"),
            Url::parse(DEFAULT_BASE_URL).unwrap(),
        );
        let result = flow(&mock)
            .step_user(Some(input("pw", DEFAULT_BASE_URL)), &[existing])
            .await;

        assert!(matches!(
            result,
            FlowResult::Abort {
                reason: AbortReason::AlreadyConfigured
            }
        ));
    }

    #[tokio::test]
    async fn reauth_updates_password() {
        let mock = MockHikConnect::new("user@example.com", "new-pw");
        let entry = ConfigEntry::new(
            "user@example.com",
            SecretString::from("old-pw"),
            Url::parse(DEFAULT_BASE_URL).unwrap(),
        );
        let flow = flow(&mock);

        let result = flow
            .step_reauth(&entry, Some(SecretString::from("still-wrong")))
            .await;
        assert_eq!(
            form_errors(&result),
            BTreeMap::from([(FIELD_BASE, FlowError::LoginFailed)])
        );
        assert!(mock.is_closed());
        mock.reopen();

        let result = flow
            .step_reauth(&entry, Some(SecretString::from("new-pw")))
            .await;
        let FlowResult::UpdateEntry { entry: updated } = result else {
            panic!("expected update, got {result:?}");
        };
        assert_eq!(updated.entry_id, entry.entry_id);
        assert_eq!(updated.data.password.expose_secret(), "new-pw");
    }
}
