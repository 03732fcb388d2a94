//! Public GitHub profile summary.
//!
//! Fetches a user and up to 100 of their repositories from the REST API and
//! renders a short prose summary the model can quote from.

use scribe_types::{Tool, ToolContext, ToolDefinition, ToolFuture, ToolOutput};
use serde::Deserialize;
use std::fmt::Write;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("scribe/", env!("CARGO_PKG_VERSION"));
const TOP_REPOS: usize = 5;
const RECENT_REPOS: usize = 3;
const TOP_LANGUAGES: usize = 8;

pub const MISSING_USERNAME_MESSAGE: &str = "Error: GITHUB_USERNAME not set. Set `GITHUB_USERNAME` \
                                            in the environment or `github.username` in config.toml.";

#[derive(Debug, Clone, Deserialize)]
pub struct GithubUser {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub public_repos: u64,
    #[serde(default)]
    pub followers: u64,
    #[serde(default)]
    pub following: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubRepo {
    pub name: String,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub pushed_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl GithubRepo {
    fn last_activity(&self) -> &str {
        self.pushed_at
            .as_deref()
            .or(self.updated_at.as_deref())
            .unwrap_or("")
    }
}

/// Aggregated view of a profile.
#[derive(Debug, Clone)]
pub struct ProfileSummary {
    pub user: GithubUser,
    pub total_stars: u64,
    pub top_repos: Vec<GithubRepo>,
    /// Repo count per language, most used first.
    pub languages: Vec<(String, usize)>,
    pub recent: Vec<GithubRepo>,
}

impl ProfileSummary {
    pub fn from_parts(user: GithubUser, repos: Vec<GithubRepo>) -> Self {
        let total_stars = repos.iter().map(|r| r.stargazers_count).sum();

        let mut top_repos = repos.clone();
        top_repos.sort_by(|a, b| b.stargazers_count.cmp(&a.stargazers_count));
        top_repos.truncate(TOP_REPOS);

        // First-seen order breaks ties between equally used languages.
        let mut languages: Vec<(String, usize)> = Vec::new();
        for lang in repos.iter().filter_map(|r| r.language.as_deref()) {
            match languages.iter_mut().find(|(l, _)| l == lang) {
                Some((_, n)) => *n += 1,
                None => languages.push((lang.to_string(), 1)),
            }
        }
        languages.sort_by(|a, b| b.1.cmp(&a.1));

        let mut recent = repos;
        recent.sort_by(|a, b| b.last_activity().cmp(a.last_activity()));
        recent.truncate(RECENT_REPOS);

        Self {
            user,
            total_stars,
            top_repos,
            languages,
            recent,
        }
    }

    pub fn render(&self) -> String {
        let user = &self.user;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "GitHub profile for {} ({})",
            user.login,
            user.name.as_deref().unwrap_or("")
        );
        if let Some(bio) = user.bio.as_deref().filter(|b| !b.is_empty()) {
            let _ = writeln!(out, "Bio: {bio}");
        }
        let _ = writeln!(
            out,
            "Public repos: {} | Followers: {} | Following: {}",
            user.public_repos, user.followers, user.following
        );
        let _ = writeln!(out, "Total stars across fetched repos: {}", self.total_stars);

        out.push_str("Top repos by stars:\n");
        for r in &self.top_repos {
            let _ = writeln!(
                out,
                "- {}: {} stars | {} | {}",
                r.name,
                r.stargazers_count,
                r.language.as_deref().unwrap_or("unknown"),
                r.html_url.as_deref().unwrap_or("")
            );
        }

        if !self.languages.is_empty() {
            let langs: Vec<String> = self
                .languages
                .iter()
                .take(TOP_LANGUAGES)
                .map(|(lang, n)| format!("{lang}({n})"))
                .collect();
            let _ = writeln!(out, "Languages used (by repo count): {}", langs.join(", "));
        }

        out.push_str("Recently updated repos:\n");
        for r in &self.recent {
            let _ = writeln!(out, "- {}: pushed_at {}", r.name, r.last_activity());
        }

        out.push_str("\n(End of GitHub summary)");
        out
    }
}

/// Minimal GitHub REST client.
#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Fetch and aggregate a profile. The error is the text to show the model.
    pub async fn profile(&self, username: &str) -> Result<ProfileSummary, String> {
        let user: GithubUser = self
            .get_json(&format!("{}/users/{username}", self.base_url), "user")
            .await?;
        let repos: Vec<GithubRepo> = self
            .get_json(
                &format!("{}/users/{username}/repos?per_page=100", self.base_url),
                "repos",
            )
            .await?;
        tracing::debug!("Fetched GitHub profile {username} with {} repos", repos.len());
        Ok(ProfileSummary::from_parts(user, repos))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        what: &str,
    ) -> Result<T, String> {
        let mut request = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header(reqwest::header::AUTHORIZATION, format!("token {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("Failed to fetch {what}: {e}"))?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Failed to fetch {what}: {} {body}", status.as_u16()));
        }
        response
            .json()
            .await
            .map_err(|e| format!("Failed to fetch {what}: invalid response: {e}"))
    }
}

/// Summarizes the configured user's public GitHub footprint.
pub struct GithubProfileTool {
    username: Option<String>,
    client: GithubClient,
}

impl GithubProfileTool {
    pub fn new(username: Option<String>, client: GithubClient) -> Self {
        Self {
            username: username.filter(|u| !u.is_empty()),
            client,
        }
    }
}

impl Tool for GithubProfileTool {
    fn name(&self) -> &str {
        "github_profile_tool"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Fetch the candidate's public GitHub profile and repositories and \
                          return a short summary: top repos, languages and recent activity."
                .to_string(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async move {
            let Some(username) = self.username.as_deref() else {
                return Ok(ToolOutput::error(MISSING_USERNAME_MESSAGE));
            };
            Ok(match self.client.profile(username).await {
                Ok(summary) => ToolOutput::text(summary.render()),
                Err(message) => {
                    tracing::warn!("GitHub profile fetch failed: {message}");
                    ToolOutput::error(message)
                }
            })
        })
    }
}
