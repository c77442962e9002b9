//! Rendering of [`ConnectionParameters`] for a target client.

use super::{ConnectionParameters, Dialect, Password};
use crate::constants::DEFAULT_ODBC_DRIVER;
use std::borrow::Cow;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Parameters in the shape the native TDS client takes them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TdsTarget {
    pub server: String,
    pub username: String,
    pub password: Password,
    pub database: String,
    pub port: u16,
    pub encrypt: bool,
    pub trust_server_certificate: bool,
}

impl TdsTarget {
    /// `(server, username, password, database)`
    #[must_use]
    pub fn as_tuple(&self) -> (&str, &str, &str, &str) {
        (
            &self.server,
            &self.username,
            self.password.expose(),
            &self.database,
        )
    }
}

impl From<&ConnectionParameters> for TdsTarget {
    fn from(params: &ConnectionParameters) -> Self {
        Self {
            server: params.server.clone(),
            username: params.username.clone(),
            password: params.password.clone(),
            database: params.database.clone(),
            port: params.port,
            encrypt: params.encrypt,
            trust_server_certificate: params.trust_server_certificate,
        }
    }
}

/// ODBC connection string; holds the password in clear, so it zeroizes on drop
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct OdbcConnectionString {
    full: String,
    redacted: String,
}

impl OdbcConnectionString {
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.full
    }

    /// Same string with `PWD=***`
    #[must_use]
    pub fn redacted(&self) -> &str {
        &self.redacted
    }
}

impl fmt::Debug for OdbcConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OdbcConnectionString")
            .field(&self.redacted)
            .finish()
    }
}

/// Output of [`super::translate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translated {
    Tds(TdsTarget),
    Odbc(OdbcConnectionString),
}

impl Translated {
    /// Printable form with the password masked
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Translated::Tds(target) => format!(
                "server={}, username={}, password=***, database={}, port={}, encrypt={}, trustServerCertificate={}",
                target.server,
                target.username,
                target.database,
                target.port,
                target.encrypt,
                target.trust_server_certificate
            ),
            Translated::Odbc(odbc) => odbc.redacted().to_string(),
        }
    }
}

#[must_use]
pub fn render(params: &ConnectionParameters, dialect: Dialect) -> Translated {
    match dialect {
        Dialect::Tds => Translated::Tds(TdsTarget::from(params)),
        Dialect::Odbc => Translated::Odbc(OdbcConnectionString {
            full: odbc_string(params, &odbc_value(params.password.expose())),
            redacted: odbc_string(params, "***"),
        }),
    }
}

fn odbc_string(params: &ConnectionParameters, pwd: &str) -> String {
    let driver = params.driver.as_deref().unwrap_or(DEFAULT_ODBC_DRIVER);
    format!(
        "DRIVER={{{}}};SERVER={};DATABASE={};UID={};PWD={};Encrypt={};TrustServerCertificate={};PORT={}",
        driver.replace('}', "}}"),
        odbc_value(&params.server),
        odbc_value(&params.database),
        odbc_value(&params.username),
        pwd,
        yes_no(params.encrypt),
        yes_no(params.trust_server_certificate),
        params.port,
    )
}

/// Brace-quote values the ODBC attribute grammar would otherwise misread
fn odbc_value(value: &str) -> Cow<'_, str> {
    let needs_quoting = value.contains([';', '{', '}']) || value.trim() != value;
    if needs_quoting {
        Cow::Owned(format!("{{{}}}", value.replace('}', "}}")))
    } else {
        Cow::Borrowed(value)
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_string::{parse, translate, RawConnectionString};

    fn params(raw: &str) -> ConnectionParameters {
        parse(&RawConnectionString::from(raw)).unwrap()
    }

    #[test]
    fn test_tds_tuple() {
        let translated = render(
            &params("Server=tcp:myserver.database.windows.net,1433;Database=mydb;User ID=admin;Password=p@ss;"),
            Dialect::Tds,
        );
        let Translated::Tds(target) = translated else {
            panic!("Expected TDS target");
        };
        assert_eq!(
            target.as_tuple(),
            ("myserver.database.windows.net", "admin", "p@ss", "mydb")
        );
        assert_eq!(target.port, 1433);
    }

    #[test]
    fn test_odbc_string_with_default_driver() {
        let translated = translate(
            &RawConnectionString::from("Server=tcp:srv,1433;Database=mydb;Uid=admin;Pwd=secret"),
            Dialect::Odbc,
        )
        .unwrap();
        let Translated::Odbc(odbc) = translated else {
            panic!("Expected ODBC string");
        };
        assert_eq!(
            odbc.expose(),
            "DRIVER={ODBC Driver 18 for SQL Server};SERVER=srv;DATABASE=mydb;UID=admin;PWD=secret;Encrypt=yes;TrustServerCertificate=no;PORT=1433"
        );
        assert_eq!(
            odbc.redacted(),
            "DRIVER={ODBC Driver 18 for SQL Server};SERVER=srv;DATABASE=mydb;UID=admin;PWD=***;Encrypt=yes;TrustServerCertificate=no;PORT=1433"
        );
    }

    #[test]
    fn test_odbc_keeps_existing_driver() {
        let translated = render(
            &params("Driver={ODBC Driver 17 for SQL Server};Server=s;Database=d;Uid=u;Pwd=p"),
            Dialect::Odbc,
        );
        let rendered = translated.redacted();
        assert!(rendered.starts_with("DRIVER={ODBC Driver 17 for SQL Server};"));
        assert_eq!(rendered.matches("DRIVER=").count(), 1);
    }

    #[test]
    fn test_odbc_quotes_special_values() {
        let translated = render(&params("Server=s;Database=d;Uid=u;Pwd=a;b}c"), Dialect::Odbc);
        // `;` ends the segment in the source string, so the password is `a`
        let Translated::Odbc(odbc) = translated else {
            panic!("Expected ODBC string");
        };
        assert!(odbc.expose().contains("PWD=a;"));

        assert_eq!(odbc_value("a;b}c"), "{a;b}}c}");
        assert_eq!(odbc_value(" padded"), "{ padded}");
        assert_eq!(odbc_value("plain"), "plain");
    }

    #[test]
    fn test_redacted_never_contains_password() {
        for dialect in [Dialect::Tds, Dialect::Odbc] {
            let translated = render(&params("Server=s;Database=d;Uid=u;Pwd=hunter2"), dialect);
            assert!(!translated.redacted().contains("hunter2"));
            assert!(!format!("{translated:?}").contains("hunter2"));
        }
    }
}
