use serde::Deserialize;

const HUB_DEFAULT_URL: &str = "https://huggingface.co";

/// Minimal authenticated client for the model hub REST API. Only resolves
/// repositories and verifies credentials; weight transfer belongs to the
/// (unwired) real inference path.
pub struct HubClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HubModelInfo {
    pub id: String,
    #[serde(default)]
    pub sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WhoamiResponse {
    name: String,
}

impl HubClient {
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("HF_HUB_URL").unwrap_or_else(|_| HUB_DEFAULT_URL.to_string()),
            std::env::var("HF_TOKEN").ok(),
        )
    }

    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
        }
    }

    /// Verifies the configured token against the hub and returns the account name.
    pub async fn whoami(&self) -> Result<String, String> {
        let token = self
            .token
            .as_deref()
            .ok_or("HF_TOKEN not set. Gated model access requires an authenticated token.")?;

        let response = self
            .client
            .get(format!("{}/api/whoami-v2", self.base_url))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .map_err(|e| format!("Hub auth request failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("Hub auth error: {}", response.status()));
        }

        let whoami: WhoamiResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse hub auth response: {e}"))?;

        Ok(whoami.name)
    }

    /// Resolves a repository on the hub; the bearer token unlocks gated repos.
    pub async fn model_info(&self, repo_id: &str) -> Result<HubModelInfo, String> {
        let mut request = self
            .client
            .get(format!("{}/api/models/{repo_id}", self.base_url));
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("Hub request for '{repo_id}' failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("Hub error for '{repo_id}': {}", response.status()));
        }

        response
            .json()
            .await
            .map_err(|e| format!("Failed to parse hub response for '{repo_id}': {e}"))
    }
}
