use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{Error, Result};

/// Connection settings for one OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// At most one endpoint is active; execution always dispatches to it.
    #[serde(default)]
    pub active: bool,
}

impl Endpoint {
    /// The chat completions URL for this endpoint, tolerant of a trailing
    /// slash on the configured base.
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// The set of configured endpoints, persisted as `config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl EndpointsConfig {
    /// The endpoint execution dispatches to, if one is active.
    pub fn active_endpoint(&self) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.active)
    }

    /// Adds an endpoint after validating its fields. When the new endpoint
    /// is marked active, every other endpoint is deactivated so exactly one
    /// stays active.
    pub fn add(&mut self, endpoint: Endpoint) -> Result<()> {
        if endpoint.name.trim().is_empty()
            || endpoint.base_url.trim().is_empty()
            || endpoint.api_key.trim().is_empty()
            || endpoint.model.trim().is_empty()
        {
            return Err(Error::validation(
                "endpoint name, base URL, API key and model are all required",
            ));
        }
        if Url::parse(&endpoint.base_url).is_err() {
            return Err(Error::validation(format!(
                "'{}' is not a valid base URL",
                endpoint.base_url
            )));
        }
        if self.endpoints.iter().any(|e| e.name == endpoint.name) {
            return Err(Error::validation(format!(
                "an endpoint named '{}' already exists",
                endpoint.name
            )));
        }

        if endpoint.active {
            for existing in &mut self.endpoints {
                existing.active = false;
            }
        }
        self.endpoints.push(endpoint);
        Ok(())
    }

    /// Makes the named endpoint the single active one.
    pub fn set_active(&mut self, name: &str) -> Result<()> {
        if !self.endpoints.iter().any(|e| e.name == name) {
            return Err(Error::not_found(format!("no endpoint named '{}'", name)));
        }
        for endpoint in &mut self.endpoints {
            endpoint.active = endpoint.name == name;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(name: &str, active: bool) -> Endpoint {
        Endpoint {
            name: name.into(),
            base_url: "https://api.example.com/v1".into(),
            api_key: "sk-test".into(),
            model: "gpt-4o-mini".into(),
            active,
        }
    }

    #[test]
    fn chat_completions_url_handles_trailing_slash() {
        let mut e = endpoint("a", false);
        e.base_url = "https://api.example.com/v1/".into();
        assert_eq!(
            e.chat_completions_url(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn add_requires_all_fields_and_a_valid_url() {
        let mut config = EndpointsConfig::default();

        let mut missing = endpoint("a", false);
        missing.api_key = "".into();
        assert!(matches!(config.add(missing), Err(Error::Validation(_))));

        let mut bad_url = endpoint("a", false);
        bad_url.base_url = "not a url".into();
        assert!(matches!(config.add(bad_url), Err(Error::Validation(_))));

        assert!(config.endpoints.is_empty());
    }

    #[test]
    fn adding_an_active_endpoint_deactivates_others() {
        let mut config = EndpointsConfig::default();
        config.add(endpoint("first", true)).unwrap();
        config.add(endpoint("second", true)).unwrap();

        let active: Vec<&str> = config
            .endpoints
            .iter()
            .filter(|e| e.active)
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(active, vec!["second"]);
    }

    #[test]
    fn set_active_is_exclusive() {
        let mut config = EndpointsConfig::default();
        config.add(endpoint("first", true)).unwrap();
        config.add(endpoint("second", false)).unwrap();

        config.set_active("second").unwrap();
        assert_eq!(config.active_endpoint().map(|e| e.name.as_str()), Some("second"));
        assert_eq!(config.endpoints.iter().filter(|e| e.active).count(), 1);

        assert!(matches!(
            config.set_active("missing"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut config = EndpointsConfig::default();
        config.add(endpoint("same", false)).unwrap();
        assert!(matches!(
            config.add(endpoint("same", false)),
            Err(Error::Validation(_))
        ));
    }
}
