use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

use crate::config::{PublishConfig, PublishKind};

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("upload to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("upload to {url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("publishing {name} rejected: {reason}")]
    Rejected { name: String, reason: String },
}

/// Where a published artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub name: String,
    pub location: String,
}

/// Hands a finished local file to its destination under a logical name.
/// Publishing the same name again replaces the previous artifact.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, path: &Path, name: &str) -> Result<PublishReceipt, PublishError>;
}

/// Copies artifacts into a shared folder.
pub struct DirectoryPublisher {
    dir: PathBuf,
}

impl DirectoryPublisher {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait::async_trait]
impl Publisher for DirectoryPublisher {
    async fn publish(&self, path: &Path, name: &str) -> Result<PublishReceipt, PublishError> {
        validate_name(name)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| PublishError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let dest = self.dir.join(name);
        let location = dest.display().to_string();

        // Copying a file onto itself would truncate it.
        if let (Ok(src), Ok(dst)) = (
            tokio::fs::canonicalize(path).await,
            tokio::fs::canonicalize(&dest).await,
        ) {
            if src == dst {
                return Ok(PublishReceipt {
                    name: name.to_string(),
                    location,
                });
            }
        }

        tokio::fs::copy(path, &dest)
            .await
            .map_err(|source| PublishError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(PublishReceipt {
            name: name.to_string(),
            location,
        })
    }
}

/// Uploads artifacts with `PUT {base_url}/{name}`.
pub struct HttpPublisher {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpPublisher {
    pub fn new(base_url: impl Into<String>, bearer_token: Option<String>) -> Result<Self, PublishError> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|source| PublishError::Http {
                url: base_url.clone(),
                source,
            })?;
        Ok(Self {
            client,
            base_url,
            bearer_token,
        })
    }
}

#[async_trait::async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, path: &Path, name: &str) -> Result<PublishReceipt, PublishError> {
        validate_name(name)?;

        let body = tokio::fs::read(path).await.map_err(|source| PublishError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), name);
        let mut req = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, "text/csv")
            .body(body);
        if let Some(token) = &self.bearer_token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let resp = req.send().await.map_err(|source| PublishError::Http {
            url: url.clone(),
            source,
        })?;
        if !resp.status().is_success() {
            return Err(PublishError::Status {
                url,
                status: resp.status(),
            });
        }

        Ok(PublishReceipt {
            name: name.to_string(),
            location: url,
        })
    }
}

fn validate_name(name: &str) -> Result<(), PublishError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\');
    if bad {
        return Err(PublishError::Rejected {
            name: name.to_string(),
            reason: "logical name must be a plain file name".to_string(),
        });
    }
    Ok(())
}

/// Publisher selected by the `[publish]` config section.
pub enum ConfiguredPublisher {
    Directory(DirectoryPublisher),
    Http(HttpPublisher),
}

impl ConfiguredPublisher {
    pub fn from_config(cfg: &PublishConfig) -> Result<Self, PublishError> {
        match cfg.kind {
            PublishKind::Directory => {
                let dir = cfg.directory.clone().ok_or_else(|| PublishError::Rejected {
                    name: "directory".to_string(),
                    reason: "publish.directory is not set".to_string(),
                })?;
                Ok(Self::Directory(DirectoryPublisher::new(dir)))
            }
            PublishKind::Http => {
                let url = cfg.url.clone().ok_or_else(|| PublishError::Rejected {
                    name: "http".to_string(),
                    reason: "publish.url is not set".to_string(),
                })?;
                Ok(Self::Http(HttpPublisher::new(url, cfg.bearer_token.clone())?))
            }
        }
    }
}

#[async_trait::async_trait]
impl Publisher for ConfiguredPublisher {
    async fn publish(&self, path: &Path, name: &str) -> Result<PublishReceipt, PublishError> {
        match self {
            Self::Directory(p) => p.publish(path, name).await,
            Self::Http(p) => p.publish(path, name).await,
        }
    }
}
