//! Connection-phase messages: the server's initial handshake, the
//! client's handshake response, auth switching, and the password
//! scrambles for the supported plugins.

use crate::constant::CapabilityFlags;
use crate::error::{Error, Result};
use crate::protocol::primitive::*;

pub const NATIVE_PASSWORD_PLUGIN: &str = "mysql_native_password";
pub const CACHING_SHA2_PLUGIN: &str = "caching_sha2_password";

// ============================================================================
// Initial Handshake Packet (Server -> Client)
// ============================================================================

/// Initial handshake from the server (Protocol::HandshakeV10).
///
/// Packet format:
/// ```text
/// 1   [0a] protocol version (always 10)
/// n   server version (null-terminated string)
/// 4   connection id
/// 8   auth-plugin-data-part-1 (first 8 bytes of the seed)
/// 1   [00] filler
/// 2   capability flags (lower 2 bytes)
/// 1   character set
/// 2   status flags
/// 2   capability flags (upper 2 bytes)
/// 1   auth plugin data length
/// 10  reserved (all 0x00)
/// n   auth-plugin-data-part-2 (remaining seed bytes)
/// n   auth plugin name (null-terminated)
/// ```
#[derive(Debug, Clone)]
pub struct InitialHandshake {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    /// The seed the password scramble is computed against.
    pub auth_plugin_data: Vec<u8>,
    pub capability_flags: CapabilityFlags,
    pub charset: u8,
    pub status_flags: u16,
    pub auth_plugin_name: String,
}

pub fn read_initial_handshake(payload: &[u8]) -> Result<InitialHandshake> {
    let (protocol_version, data) = read_int_1(payload)?;
    if protocol_version != 0x0A {
        return Err(Error::Unsupported(format!(
            "handshake protocol version {}",
            protocol_version
        )));
    }

    let (server_version_bytes, data) = read_string_null(data)?;
    let server_version = String::from_utf8_lossy(server_version_bytes).into_owned();

    let (connection_id, data) = read_int_4(data)?;

    let (auth_data_1, data) = read_string_fix(data, 8)?;
    let (_filler, data) = read_int_1(data)?;
    let (cap_lower, data) = read_int_2(data)?;
    let (charset, data) = read_int_1(data)?;
    let (status_flags, data) = read_int_2(data)?;
    let (cap_upper, data) = read_int_2(data)?;

    let cap_bits = ((cap_upper as u32) << 16) | (cap_lower as u32);
    let capability_flags = CapabilityFlags::from_bits_truncate(cap_bits);

    let (auth_data_len, data) = read_int_1(data)?;
    let (_reserved, data) = read_string_fix(data, 10)?;

    // Part 2 is max(13, auth_data_len - 8) bytes with a trailing NUL.
    let auth_data_2_len = (auth_data_len as usize).saturating_sub(9).max(12);
    let (auth_data_2, data) = read_string_fix(data, auth_data_2_len)?;
    let (_terminator, data) = read_int_1(data)?;

    let mut auth_plugin_data = Vec::with_capacity(auth_data_1.len() + auth_data_2.len());
    auth_plugin_data.extend_from_slice(auth_data_1);
    auth_plugin_data.extend_from_slice(auth_data_2);

    let auth_plugin_name = if capability_flags.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH) {
        // Some servers terminate the name, some let it run to the end of
        // the frame.
        match read_string_null(data) {
            Ok((name, _rest)) => String::from_utf8_lossy(name).into_owned(),
            Err(_) => String::from_utf8_lossy(data).into_owned(),
        }
    } else {
        NATIVE_PASSWORD_PLUGIN.to_string()
    };

    Ok(InitialHandshake {
        protocol_version,
        server_version,
        connection_id,
        auth_plugin_data,
        capability_flags,
        charset,
        status_flags,
        auth_plugin_name,
    })
}

// ============================================================================
// Handshake Response Packet (Client -> Server)
// ============================================================================

/// Handshake response sent by the client (HandshakeResponse41).
///
/// Packet format:
/// ```text
/// 4   capability flags
/// 4   max packet size
/// 1   character set
/// 23  reserved (all 0x00)
/// n   username (null-terminated string)
/// n   auth response (length-encoded)
/// n   database name (null-terminated, if CLIENT_CONNECT_WITH_DB)
/// n   auth plugin name (null-terminated, if CLIENT_PLUGIN_AUTH)
/// n   connection attributes (if CLIENT_CONNECT_ATTRS)
/// ```
#[derive(Debug, Clone)]
pub struct HandshakeResponse41<'a> {
    pub capability_flags: CapabilityFlags,
    pub max_packet_size: u32,
    pub charset: u8,
    pub username: &'a str,
    pub auth_response: &'a [u8],
    pub database: Option<&'a str>,
    pub auth_plugin_name: Option<&'a str>,
    /// Sent as the `program_name` connection attribute.
    pub application_name: Option<&'a str>,
}

pub fn write_handshake_response(out: &mut Vec<u8>, response: &HandshakeResponse41<'_>) {
    write_int_4(out, response.capability_flags.bits());
    write_int_4(out, response.max_packet_size);
    write_int_1(out, response.charset);
    out.extend_from_slice(&[0u8; 23]);

    write_string_null(out, response.username);
    write_bytes_lenenc(out, response.auth_response);

    if response
        .capability_flags
        .contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB)
    {
        if let Some(db) = response.database {
            write_string_null(out, db);
        }
    }

    if response
        .capability_flags
        .contains(CapabilityFlags::CLIENT_PLUGIN_AUTH)
    {
        if let Some(plugin) = response.auth_plugin_name {
            write_string_null(out, plugin);
        }
    }

    if response
        .capability_flags
        .contains(CapabilityFlags::CLIENT_CONNECT_ATTRS)
    {
        if let Some(app_name) = response.application_name {
            let mut attrs = Vec::new();
            write_string_lenenc(&mut attrs, "_client_name");
            write_string_lenenc(&mut attrs, "quill-mysql");
            write_string_lenenc(&mut attrs, "program_name");
            write_string_lenenc(&mut attrs, app_name);
            write_bytes_lenenc(out, &attrs);
        }
    }
}

// ============================================================================
// Auth Switch Request Packet (Server -> Client)
// ============================================================================

/// The server asks to restart authentication with a different plugin.
///
/// Packet format:
/// ```text
/// 1   [fe] status
/// n   plugin name (null-terminated)
/// n   plugin data (new seed for the requested plugin)
/// ```
#[derive(Debug, Clone)]
pub struct AuthSwitchRequest {
    pub plugin_name: String,
    pub plugin_data: Vec<u8>,
}

pub fn read_auth_switch_request(payload: &[u8]) -> Result<AuthSwitchRequest> {
    let (header, data) = read_int_1(payload)?;
    if header != 0xFE {
        return Err(Error::InvalidPacket);
    }

    let (plugin_name, data) = read_string_null(data)?;

    // The seed usually carries a trailing NUL.
    let plugin_data = match data.last() {
        Some(0) => &data[..data.len() - 1],
        _ => data,
    };

    Ok(AuthSwitchRequest {
        plugin_name: String::from_utf8_lossy(plugin_name).into_owned(),
        plugin_data: plugin_data.to_vec(),
    })
}

/// The auth switch response is the bare credential material for the
/// requested plugin.
pub fn write_auth_switch_response(out: &mut Vec<u8>, auth_data: &[u8]) {
    out.extend_from_slice(auth_data);
}

// ============================================================================
// Authentication Plugins
// ============================================================================

/// Compute the auth response for a plugin against the server seed.
///
/// Unknown plugins are refused; the caller surfaces that as a failed
/// connect.
pub fn scramble_password(plugin: &str, password: &str, seed: &[u8]) -> Result<Vec<u8>> {
    match plugin {
        NATIVE_PASSWORD_PLUGIN => Ok(scramble_native_password(password, seed).to_vec()),
        CACHING_SHA2_PLUGIN => Ok(scramble_caching_sha2(password, seed).to_vec()),
        other => Err(Error::Unsupported(format!(
            "authentication plugin '{}'",
            other
        ))),
    }
}

/// mysql_native_password: `SHA1(password) XOR SHA1(seed + SHA1(SHA1(password)))`.
///
/// An empty password scrambles to an empty response.
pub fn scramble_native_password(password: &str, seed: &[u8]) -> Vec<u8> {
    use sha1::{Digest, Sha1};

    if password.is_empty() {
        return Vec::new();
    }

    // The scramble is computed against the first 20 seed bytes.
    let seed = &seed[..seed.len().min(20)];

    let mut hasher = Sha1::new();
    hasher.update(password.as_bytes());
    let stage1 = hasher.finalize();

    let mut hasher = Sha1::new();
    hasher.update(stage1);
    let stage2 = hasher.finalize();

    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(stage2);
    let token = hasher.finalize();

    stage1
        .iter()
        .zip(token.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// caching_sha2_password: `SHA256(password) XOR SHA256(SHA256(SHA256(password)) + seed)`.
pub fn scramble_caching_sha2(password: &str, seed: &[u8]) -> Vec<u8> {
    use sha2::{Digest, Sha256};

    if password.is_empty() {
        return Vec::new();
    }

    let seed = &seed[..seed.len().min(20)];

    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    let stage1 = hasher.finalize();

    let mut hasher = Sha256::new();
    hasher.update(stage1);
    let stage2 = hasher.finalize();

    let mut hasher = Sha256::new();
    hasher.update(stage2);
    hasher.update(seed);
    let scramble = hasher.finalize();

    stage1
        .iter()
        .zip(scramble.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// In the caching_sha2 flow the server answers the first scramble with a
/// one-byte `0x01`-framed status: fast-auth success or full auth needed.
pub const FAST_AUTH_SUCCESS: u8 = 0x03;
pub const FULL_AUTH_REQUIRED: u8 = 0x04;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_handshake_payload() -> Vec<u8> {
        let mut out = vec![0x0A];
        out.extend_from_slice(b"5.7.26-log\0");
        out.extend_from_slice(&42u32.to_le_bytes());
        out.extend_from_slice(&[0, 1, 2, 3, 4, 5, 6, 7]); // seed part 1
        out.push(0x00); // filler
        let caps = CapabilityFlags::CLIENT_PROTOCOL_41
            | CapabilityFlags::CLIENT_SECURE_CONNECTION
            | CapabilityFlags::CLIENT_PLUGIN_AUTH;
        let bits = caps.bits();
        out.extend_from_slice(&(bits as u16).to_le_bytes());
        out.push(33); // charset
        out.extend_from_slice(&0u16.to_le_bytes()); // status
        out.extend_from_slice(&((bits >> 16) as u16).to_le_bytes());
        out.push(21); // auth data len
        out.extend_from_slice(&[0u8; 10]); // reserved
        out.extend_from_slice(&[8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19]); // seed part 2
        out.push(0x00);
        out.extend_from_slice(b"mysql_native_password\0");
        out
    }

    #[test]
    fn parses_initial_handshake() {
        let handshake = read_initial_handshake(&sample_handshake_payload()).unwrap();
        assert_eq!(handshake.server_version, "5.7.26-log");
        assert_eq!(handshake.connection_id, 42);
        assert_eq!(handshake.auth_plugin_data.len(), 20);
        assert_eq!(
            handshake.auth_plugin_data,
            (0u8..20).collect::<Vec<u8>>()
        );
        assert_eq!(handshake.auth_plugin_name, "mysql_native_password");
        assert_eq!(handshake.charset, 33);
    }

    #[test]
    fn rejects_wrong_protocol_version() {
        assert!(matches!(
            read_initial_handshake(&[0x09, 0x00]),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn native_scramble_is_twenty_bytes() {
        let seed: Vec<u8> = (0..20).collect();
        let scramble = scramble_native_password("secret", &seed);
        assert_eq!(scramble.len(), 20);
        // Deterministic: same inputs, same scramble.
        assert_eq!(scramble, scramble_native_password("secret", &seed));
        // Seed-sensitive.
        let other_seed: Vec<u8> = (1..21).collect();
        assert_ne!(scramble, scramble_native_password("secret", &other_seed));
    }

    #[test]
    fn empty_password_scrambles_empty() {
        assert!(scramble_native_password("", &[0; 20]).is_empty());
        assert!(scramble_caching_sha2("", &[0; 20]).is_empty());
    }

    #[test]
    fn caching_sha2_scramble_is_thirty_two_bytes() {
        let seed: Vec<u8> = (0..20).collect();
        assert_eq!(scramble_caching_sha2("secret", &seed).len(), 32);
    }

    #[test]
    fn unknown_plugin_is_refused() {
        assert!(matches!(
            scramble_password("sha256_password", "x", &[0; 20]),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn parses_auth_switch_request() {
        let mut payload = vec![0xFE];
        payload.extend_from_slice(b"mysql_native_password\0");
        payload.extend_from_slice(&[1, 2, 3, 4, 0]);
        let req = read_auth_switch_request(&payload).unwrap();
        assert_eq!(req.plugin_name, "mysql_native_password");
        assert_eq!(req.plugin_data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn handshake_response_layout() {
        let mut out = Vec::new();
        let caps = CapabilityFlags::CLIENT_PROTOCOL_41
            | CapabilityFlags::CLIENT_PLUGIN_AUTH
            | CapabilityFlags::CLIENT_CONNECT_WITH_DB;
        write_handshake_response(
            &mut out,
            &HandshakeResponse41 {
                capability_flags: caps,
                max_packet_size: 0x0100_0000,
                charset: 33,
                username: "root",
                auth_response: &[0xAA; 20],
                database: Some("mydb"),
                auth_plugin_name: Some(NATIVE_PASSWORD_PLUGIN),
                application_name: None,
            },
        );

        let (cap_bits, rest) = read_int_4(&out).unwrap();
        assert_eq!(cap_bits, caps.bits());
        let (_max_packet, rest) = read_int_4(rest).unwrap();
        let (charset, rest) = read_int_1(rest).unwrap();
        assert_eq!(charset, 33);
        let (_reserved, rest) = read_string_fix(rest, 23).unwrap();
        let (user, rest) = read_string_null(rest).unwrap();
        assert_eq!(user, b"root");
        let (auth, rest) = read_string_lenenc(rest).unwrap();
        assert_eq!(auth.len(), 20);
        let (db, rest) = read_string_null(rest).unwrap();
        assert_eq!(db, b"mydb");
        let (plugin, rest) = read_string_null(rest).unwrap();
        assert_eq!(plugin, NATIVE_PASSWORD_PLUGIN.as_bytes());
        assert!(rest.is_empty());
    }

    #[test]
    fn connect_attrs_carry_program_name() {
        let mut out = Vec::new();
        let caps = CapabilityFlags::CLIENT_PROTOCOL_41 | CapabilityFlags::CLIENT_CONNECT_ATTRS;
        write_handshake_response(
            &mut out,
            &HandshakeResponse41 {
                capability_flags: caps,
                max_packet_size: 0x0100_0000,
                charset: 45,
                username: "app",
                auth_response: &[],
                database: None,
                auth_plugin_name: None,
                application_name: Some("reporting"),
            },
        );

        // skip the fixed head and the username/auth fields
        let rest = &out[4 + 4 + 1 + 23..];
        let (_user, rest) = read_string_null(rest).unwrap();
        let (_auth, rest) = read_string_lenenc(rest).unwrap();

        let (attrs, rest) = read_string_lenenc(rest).unwrap();
        assert!(rest.is_empty());

        let (key, attrs) = read_string_lenenc(attrs).unwrap();
        assert_eq!(key, b"_client_name");
        let (_value, attrs) = read_string_lenenc(attrs).unwrap();
        let (key, attrs) = read_string_lenenc(attrs).unwrap();
        assert_eq!(key, b"program_name");
        let (value, attrs) = read_string_lenenc(attrs).unwrap();
        assert_eq!(value, b"reporting");
        assert!(attrs.is_empty());
    }
}
