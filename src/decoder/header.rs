//! The two-byte version word every NetFlow/IPFIX datagram opens with
//! (spec §4.3). Mirrors the teacher crate's `NetflowHeader` / version-enum
//! split between "bytes we understood" and "bytes we didn't".

use nom::number::complete::be_u16;
use nom_derive::{Nom, Parse};

use super::DecodeError;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum NetflowVersion {
    V9,
    IPFix,
    Unsupported(u16),
}

impl From<u16> for NetflowVersion {
    fn from(version: u16) -> Self {
        match version {
            9 => NetflowVersion::V9,
            10 => NetflowVersion::IPFix,
            other => NetflowVersion::Unsupported(other),
        }
    }
}

#[derive(Nom)]
struct VersionWord {
    #[nom(Map = "NetflowVersion::from", Parse = "be_u16")]
    version: NetflowVersion,
}

/// Splits the version word off the front of `packet`, returning the
/// version and the remaining bytes.
pub fn parse_version(packet: &[u8]) -> Result<(NetflowVersion, &[u8]), DecodeError> {
    let (remaining, word) = VersionWord::parse_be(packet).map_err(|_| DecodeError::Truncated)?;
    Ok((word.version, remaining))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_v9_and_ipfix() {
        assert_eq!(parse_version(&[0, 9, 1, 2]).unwrap().0, NetflowVersion::V9);
        assert_eq!(
            parse_version(&[0, 10, 1, 2]).unwrap().0,
            NetflowVersion::IPFix
        );
    }

    #[test]
    fn unsupported_version_is_reported_not_dropped_silently() {
        assert_eq!(
            parse_version(&[0, 5, 1, 2]).unwrap().0,
            NetflowVersion::Unsupported(5)
        );
    }

    #[test]
    fn truncated_header_is_an_error() {
        assert_eq!(parse_version(&[0]), Err(DecodeError::Truncated));
    }
}
