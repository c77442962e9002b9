//! Connection-string parsing.
//!
//! Keys are matched case-insensitively, values keep their casing. A segment is
//! split on its first `=` only, so values may contain `=`. Aliases of one field
//! behave like repeats of that field: the last one in the string wins.

use super::{ConnectionParameters, Field, Password, RawConnectionString, TranslationError};
use crate::constants::DEFAULT_SQL_PORT;

/// Which logical field a source key feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Server,
    Port,
    Database,
    Username,
    Password,
    Encrypt,
    TrustServerCertificate,
    Driver,
}

fn slot_for_key(key: &str) -> Option<Slot> {
    match key {
        "server" | "data source" | "address" | "addr" | "network address" => Some(Slot::Server),
        "port" => Some(Slot::Port),
        "database" | "initial catalog" => Some(Slot::Database),
        "user id" | "uid" | "user" => Some(Slot::Username),
        "password" | "pwd" => Some(Slot::Password),
        "encrypt" => Some(Slot::Encrypt),
        "trustservercertificate" | "trust server certificate" => {
            Some(Slot::TrustServerCertificate)
        }
        "driver" => Some(Slot::Driver),
        _ => None,
    }
}

/// Raw values collected per logical field, before validation
#[derive(Debug, Default)]
struct Collected<'a> {
    server: Option<&'a str>,
    port: Option<&'a str>,
    database: Option<&'a str>,
    username: Option<&'a str>,
    password: Option<&'a str>,
    encrypt: Option<&'a str>,
    trust_server_certificate: Option<&'a str>,
    driver: Option<&'a str>,
}

impl<'a> Collected<'a> {
    fn from_raw(raw: &'a str) -> Self {
        let mut collected = Self::default();

        for segment in raw.split(';') {
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            let Some(slot) = slot_for_key(&key) else {
                continue;
            };
            let target = match slot {
                Slot::Server => &mut collected.server,
                Slot::Port => &mut collected.port,
                Slot::Database => &mut collected.database,
                Slot::Username => &mut collected.username,
                Slot::Password => &mut collected.password,
                Slot::Encrypt => &mut collected.encrypt,
                Slot::TrustServerCertificate => &mut collected.trust_server_certificate,
                Slot::Driver => &mut collected.driver,
            };
            *target = Some(value);
        }

        collected
    }
}

/// Parse a raw connection string into normalized parameters
///
/// # Errors
///
/// - [`TranslationError::MissingFields`] naming every required field (server,
///   database, username, password) that is absent or empty.
/// - [`TranslationError::InvalidValue`] for an unparsable port or boolean.
pub fn parse(raw: &RawConnectionString) -> Result<ConnectionParameters, TranslationError> {
    let collected = Collected::from_raw(raw.expose());

    let (host, server_port) = match collected.server {
        Some(server) => split_server(server),
        None => ("", None),
    };

    let mut missing = Vec::new();
    if host.is_empty() {
        missing.push(Field::Server);
    }
    let database = non_empty(collected.database);
    if database.is_none() {
        missing.push(Field::Database);
    }
    let username = non_empty(collected.username);
    if username.is_none() {
        missing.push(Field::Username);
    }
    let password = non_empty(collected.password);
    if password.is_none() {
        missing.push(Field::Password);
    }

    let (Some(database), Some(username), Some(password)) = (database, username, password) else {
        return Err(TranslationError::MissingFields(missing));
    };
    if !missing.is_empty() {
        return Err(TranslationError::MissingFields(missing));
    }

    // `server=host,port` beats a separate `port=` key
    let port = match server_port.or(non_empty(collected.port)) {
        Some(port) => parse_port(port)?,
        None => DEFAULT_SQL_PORT,
    };

    Ok(ConnectionParameters {
        server: host.to_string(),
        port,
        database: database.to_string(),
        username: username.to_string(),
        password: Password::new(password),
        encrypt: parse_flag(Field::Encrypt, collected.encrypt, true)?,
        trust_server_certificate: parse_flag(
            Field::TrustServerCertificate,
            collected.trust_server_certificate,
            false,
        )?,
        driver: non_empty(collected.driver)
            .map(|d| d.trim_start_matches('{').trim_end_matches('}').trim())
            .filter(|d| !d.is_empty())
            .map(str::to_string),
    })
}

/// Strip a leading `tcp:` (any case) and split off a trailing `,port`
fn split_server(server: &str) -> (&str, Option<&str>) {
    let server = server.trim();
    let host = match server.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("tcp:") => &server[4..],
        _ => server,
    };
    match host.rsplit_once(',') {
        Some((host, port)) => (host.trim(), Some(port.trim())),
        None => (host.trim(), None),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn parse_port(value: &str) -> Result<u16, TranslationError> {
    match value.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(TranslationError::InvalidValue {
            field: Field::Port,
            value: value.to_string(),
        }),
    }
}

fn parse_flag(field: Field, value: Option<&str>, default: bool) -> Result<bool, TranslationError> {
    let Some(value) = non_empty(value) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "mandatory" | "strict" => Ok(true),
        "false" | "no" | "0" | "optional" => Ok(false),
        _ => Err(TranslationError::InvalidValue {
            field,
            value: value.to_string(),
        }),
    }
}
