use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw mapping stored at a secret path.
pub type SecretData = Map<String, Value>;

const PASSWORD_FIELD: &str = "password";

/// Credential record kept for every author and publish instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub password: String,
}

impl SecretRecord {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }

    /// Reads the record from raw secret data.
    ///
    /// Missing, non-string or empty passwords yield `None`.
    pub fn from_data(data: &SecretData) -> Option<Self> {
        match data.get(PASSWORD_FIELD) {
            Some(Value::String(pwd)) if !pwd.is_empty() => Some(Self::new(pwd.clone())),
            _ => None,
        }
    }

    pub fn to_data(&self) -> SecretData {
        let mut data = Map::new();
        data.insert(PASSWORD_FIELD.to_string(), Value::String(self.password.clone()));
        data
    }
}

/// `secret/{namespace}/{deployment}`: prefix of every secret of a deployment.
pub fn secret_base_path(namespace: &str, deployment: &str) -> String {
    format!("secret/{namespace}/{deployment}")
}

/// `secret/{namespace}/{deployment}/{instance}`.
pub fn instance_secret_path(namespace: &str, deployment: &str, instance: &str) -> String {
    format!("{}/{instance}", secret_base_path(namespace, deployment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_is_deterministic() {
        assert_eq!(
            instance_secret_path("demo", "example-aem", "author-001"),
            "secret/demo/example-aem/author-001"
        );
        assert_eq!(secret_base_path("demo", "example-aem"), "secret/demo/example-aem");
    }

    #[test]
    fn record_from_data_ignores_bad_values() {
        let data = |v: Value| v.as_object().cloned().unwrap_or_default();

        assert_eq!(
            SecretRecord::from_data(&data(json!({"password": "s3cret"}))),
            Some(SecretRecord::new("s3cret"))
        );
        assert_eq!(SecretRecord::from_data(&data(json!({"password": 42}))), None);
        assert_eq!(SecretRecord::from_data(&data(json!({"password": ""}))), None);
        assert_eq!(SecretRecord::from_data(&data(json!({}))), None);
    }

    #[test]
    fn record_data_shape() {
        let data = SecretRecord::new("pwd").to_data();
        assert_eq!(Value::Object(data), json!({"password": "pwd"}));
    }
}
