//! Status request lines sent to the server.

use std::fmt;

/// What to list inside a backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Browse {
    /// Directory listing.
    Dir(String),
    /// Single file entry.
    File(String),
}

/// A request for status information.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StatusRequest {
    /// Summary of every client.
    #[default]
    All,
    /// Detail of one client.
    Client(String),
    /// One backup of a client, optionally browsing its contents.
    Backup {
        client: String,
        backup: String,
        browse: Option<Browse>,
    },
}

impl StatusRequest {
    /// Narrowest request the given selectors describe.
    ///
    /// A backup without a client, or a browse without a backup, is ignored.
    pub fn new(client: Option<&str>, backup: Option<&str>, browse: Option<Browse>) -> Self {
        match (client, backup) {
            (None, _) => Self::All,
            (Some(client), None) => Self::Client(client.to_string()),
            (Some(client), Some(backup)) => Self::Backup {
                client: client.to_string(),
                backup: backup.to_string(),
                browse,
            },
        }
    }

    /// Client this request is about, if any.
    pub fn client(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Client(client) | Self::Backup { client, .. } => Some(client),
        }
    }

    /// Newline-terminated wire form.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for StatusRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => Ok(()),
            Self::Client(client) => write!(f, "c:{client}"),
            Self::Backup {
                client,
                backup,
                browse,
            } => {
                write!(f, "c:{client}:b:{backup}")?;
                match browse {
                    Some(Browse::Dir(dir)) => write!(f, ":p:{dir}"),
                    Some(Browse::File(file)) => write!(f, ":f:{file}"),
                    None => Ok(()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_lines() {
        assert_eq!(StatusRequest::All.to_line(), "\n");
        assert_eq!(StatusRequest::new(Some("web"), None, None).to_line(), "c:web\n");
        assert_eq!(
            StatusRequest::new(Some("web"), Some("12"), None).to_line(),
            "c:web:b:12\n"
        );
        assert_eq!(
            StatusRequest::new(Some("web"), Some("12"), Some(Browse::Dir("/etc".into()))).to_line(),
            "c:web:b:12:p:/etc\n"
        );
        assert_eq!(
            StatusRequest::new(Some("web"), Some("12"), Some(Browse::File("/etc/hosts".into())))
                .to_line(),
            "c:web:b:12:f:/etc/hosts\n"
        );
    }

    #[test]
    fn test_backup_without_client_is_all() {
        let request = StatusRequest::new(None, Some("12"), None);
        assert_eq!(request, StatusRequest::All);
        assert_eq!(request.client(), None);
    }
}
