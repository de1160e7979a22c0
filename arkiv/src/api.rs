//! API response plumbing.
use serde::{de::DeserializeOwned, Deserialize};

use crate::{errors::Error, transport::Response};

/// The `success`/`message` envelope most endpoints wrap their payload in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Envelope {
    /// Whether the server accepted the operation.
    pub success: bool,
    /// Human-readable explanation, mostly present on failures.
    pub message: Option<String>,
}

impl Envelope {
    /// Turn a rejected envelope into the matching error.
    ///
    /// # Errors
    ///
    /// [`Error::NoFolder`] for the server's folder-miss message,
    /// [`Error::Api`] for every other rejection.
    pub fn check(&self) -> crate::Result<()> {
        if self.success {
            return Ok(());
        }

        match self.message.as_deref() {
            Some("Folder not found") => Err(Error::NoFolder),
            Some(message) => Err(Error::Api(message.to_owned())),
            None => Err(Error::Api("unspecified error".to_owned())),
        }
    }
}

/// Decode a JSON body, treating any non-2xx status as an error.
pub(crate) async fn read_json<T: DeserializeOwned>(res: Response) -> crate::Result<T> {
    let status = res.status();

    if !status.is_success() {
        return Err(Error::UnexpectedStatus(status));
    }

    res.json().await
}

/// Check the status and the envelope of a response whose payload does not
/// matter.
pub(crate) async fn read_ok(res: Response) -> crate::Result<()> {
    let envelope: Envelope = read_json(res).await?;

    envelope.check()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_check() {
        let ok = Envelope {
            success: true,
            message: None,
        };
        assert!(ok.check().is_ok());

        let missing = Envelope {
            success: false,
            message: Some("Folder not found".to_owned()),
        };
        assert!(matches!(missing.check(), Err(Error::NoFolder)));

        let other = Envelope {
            success: false,
            message: Some("quota exceeded".to_owned()),
        };
        assert!(matches!(other.check(), Err(Error::Api(msg)) if msg == "quota exceeded"));

        let silent = Envelope {
            success: false,
            message: None,
        };
        assert!(matches!(silent.check(), Err(Error::Api(_))));
    }

    #[test]
    fn envelope_defaults() {
        let env: Envelope = serde_json::from_str("{}").unwrap();
        assert!(!env.success);
        assert!(env.message.is_none());
    }
}
