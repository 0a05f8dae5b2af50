//! Naming grammar for interface ids and component names
//!
//! Malformed names on registration make the service drop the connection,
//! which is hard to tell apart from a network fault. They are rejected
//! locally instead.

use crate::error::{Error, Result};
use tracing::error;

/// Scheme prefix every interface id must carry
pub const INTERFACE_ID_PREFIX: &str = "urn:";

/// Maximum length of an interface id or component name
pub const MAX_NAME_LENGTH: usize = 256;

/// Validate a component name (`is_interface_id == false`) or an interface id
///
/// Both allow ASCII letters, digits and `_`. Interface ids must start with
/// `urn:` and may also contain `:`.
pub fn validate_name(value: &str, is_interface_id: bool) -> Result<()> {
    if value.is_empty() {
        error!("Name cannot be empty");
        return Err(Error::InvalidArg);
    }

    if value.len() > MAX_NAME_LENGTH {
        error!(
            "Name {} is too long, maximum length is {}",
            value, MAX_NAME_LENGTH
        );
        return Err(Error::InvalidArg);
    }

    let body = if is_interface_id {
        value.strip_prefix(INTERFACE_ID_PREFIX).ok_or_else(|| {
            error!(
                "Interface id must be prefixed with {}. Actual value={}",
                INTERFACE_ID_PREFIX, value
            );
            Error::InvalidArg
        })?
    } else {
        value
    };

    if let Some(c) = body
        .chars()
        .find(|&c| !(c.is_ascii_alphanumeric() || c == '_' || (is_interface_id && c == ':')))
    {
        error!("Character {:?} in {} is illegal", c, value);
        return Err(Error::InvalidArg);
    }

    Ok(())
}
