use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{validate_dataset_name, Database, Dataset, DbError, Hash, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Database reached over HTTP.
///
/// Datasets are addressed as `<base>/datasets/<name>`.
pub struct RemoteDatabase {
    base: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct HeadBody {
    head: Option<Hash>,
}

#[derive(Debug, Serialize)]
struct CommitBody<'a> {
    parent: Option<Hash>,
    value: &'a Value,
}

impl RemoteDatabase {
    /// Creates a handle for the database at `base`. No request is made.
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self { base, agent }
    }

    fn dataset_url(&self, name: &str) -> String {
        format!("{}/datasets/{}", self.base, name)
    }
}

fn remote_error(method: &str, url: &str, err: ureq::Error) -> DbError {
    match err {
        ureq::Error::Status(code, _) => DbError::Remote(format!("{method} {url}: status {code}")),
        ureq::Error::Transport(transport) => DbError::Remote(format!("{method} {url}: {transport}")),
    }
}

fn read_head(method: &str, url: &str, response: ureq::Response) -> Result<Option<Hash>> {
    let body = response
        .into_string()
        .map_err(|err| DbError::Remote(format!("{method} {url}: {err}")))?;
    let parsed: HeadBody = serde_json::from_str(&body)?;
    Ok(parsed.head)
}

impl Database for RemoteDatabase {
    fn get_dataset(&self, name: &str) -> Result<Dataset> {
        validate_dataset_name(name)?;
        let url = self.dataset_url(name);
        match self.agent.get(&url).call() {
            Ok(response) => Ok(Dataset::new(name, read_head("GET", &url, response)?)),
            Err(ureq::Error::Status(404, _)) => Ok(Dataset::new(name, None)),
            Err(err) => Err(remote_error("GET", &url, err)),
        }
    }

    fn commit(&self, dataset: &Dataset, value: Value) -> Result<Dataset> {
        validate_dataset_name(dataset.name())?;
        let url = self.dataset_url(dataset.name());
        let body = serde_json::to_string(&CommitBody {
            parent: dataset.head(),
            value: &value,
        })?;
        let response = self
            .agent
            .post(&url)
            .set("content-type", "application/json")
            .send_string(&body)
            .map_err(|err| match err {
                ureq::Error::Status(409, _) => DbError::ConcurrentUpdate(dataset.name().to_string()),
                other => remote_error("POST", &url, other),
            })?;
        let head = read_head("POST", &url, response)?;
        debug!(dataset = dataset.name(), head = ?head, "committed remotely");
        Ok(Dataset::new(dataset.name(), head))
    }

    fn delete(&self, dataset: &Dataset) -> Result<Dataset> {
        validate_dataset_name(dataset.name())?;
        let url = self.dataset_url(dataset.name());
        match self.agent.delete(&url).call() {
            Ok(_) | Err(ureq::Error::Status(404, _)) => Ok(Dataset::new(dataset.name(), None)),
            Err(err) => Err(remote_error("DELETE", &url, err)),
        }
    }
}
