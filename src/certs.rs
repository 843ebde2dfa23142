//! Gen1 certificate chain verification for driver-card downloads.
//!
//! A Gen1 certificate is `signature[128] ‖ Cn'[58] ‖ CAR[8]`. The signature
//! is an ISO 9796-2 envelope: recovering it with the issuer's RSA public key
//! must give `0x6A ‖ Cr'[106] ‖ SHA1(Cr' ‖ Cn')[20] ‖ 0xBC`. The CA
//! certificate verifies against the pinned European root key and carries the
//! member-state key used to verify the card certificate. Gen2 certificates
//! are ECC and are not verified here.

use crate::error::CertificateError;
use num_bigint::BigUint;
use sha1::{Digest, Sha1};

pub const CERTIFICATE_LEN: usize = 194;
const SIGNATURE_LEN: usize = 128;

/// European root public key (ERCA), modulus and public exponent, big-endian.
const EU_RSA_N: [u8; 128] = [
    0xE9, 0x80, 0x76, 0x3A, 0x44, 0x4A, 0x95, 0x25, 0x0A, 0x95, 0x87, 0x82, 0xD1, 0xD5, 0x4A,
    0xCF, 0xC3, 0x23, 0xD2, 0x5F, 0x39, 0x46, 0xB8, 0x16, 0xE9, 0x2F, 0xCF, 0x9D, 0x32, 0xB4,
    0x2A, 0x26, 0x13, 0xD1, 0xA3, 0x63, 0xB4, 0xE4, 0x35, 0x32, 0xA0, 0x26, 0x68, 0x63, 0x29,
    0xC8, 0x96, 0x63, 0xCC, 0xC0, 0x01, 0xF7, 0x27, 0x82, 0x06, 0xB6, 0xAB, 0x65, 0xAD, 0x28,
    0x71, 0x84, 0x8A, 0x68, 0x0F, 0x6A, 0x57, 0xD8, 0xFD, 0xA1, 0xD7, 0x82, 0xC9, 0xB5, 0x81,
    0x29, 0x03, 0xEA, 0x5B, 0x66, 0xE2, 0xA9, 0xBE, 0x1D, 0x85, 0xBD, 0xD0, 0xFD, 0xAE, 0x76,
    0xA4, 0x60, 0x88, 0xD7, 0x1A, 0x61, 0x76, 0xB1, 0xF6, 0xA9, 0x84, 0x19, 0x10, 0x04, 0x24,
    0xDC, 0x56, 0xD0, 0x84, 0x6A, 0xA3, 0xC8, 0x43, 0x90, 0xD3, 0x51, 0x7A, 0x0F, 0x11, 0x92,
    0xDE, 0xDF, 0xF7, 0x40, 0x92, 0x4C, 0xDB, 0xA7,
];
const EU_RSA_E: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01];

/// `signature^e mod n`, left-padded to the modulus width.
fn rsa_recover(signature: &[u8], key_n: &[u8], key_e: &[u8]) -> Vec<u8> {
    let modulus = BigUint::from_bytes_be(key_n);
    let exponent = BigUint::from_bytes_be(key_e);
    if modulus == BigUint::default() {
        return Vec::new();
    }
    let value = BigUint::from_bytes_be(signature).modpow(&exponent, &modulus);
    let mut out = value.to_bytes_be();
    let width = (modulus.bits() as usize + 7) / 8;
    while out.len() < width {
        out.insert(0, 0);
    }
    out
}

/// Verify one certificate against an issuer key. On success returns the
/// recovered content `Cr' ‖ Cn'`, which embeds the certified public key.
fn verify_certificate(data: &[u8], key_n: &[u8], key_e: &[u8]) -> Option<Vec<u8>> {
    if data.len() < CERTIFICATE_LEN {
        return None;
    }
    let signature = &data[..SIGNATURE_LEN];
    let cn_dash = &data[SIGNATURE_LEN..SIGNATURE_LEN + 58];
    let decoded = rsa_recover(signature, key_n, key_e);
    if decoded.len() != SIGNATURE_LEN {
        return None;
    }
    if decoded[0] != 0x6A || decoded[SIGNATURE_LEN - 1] != 0xBC {
        return None;
    }
    let cr_dash = &decoded[1..107];
    let h_dash = &decoded[107..127];
    let mut content = cr_dash.to_vec();
    content.extend_from_slice(cn_dash);
    let digest = Sha1::digest(&content);
    if digest.as_slice() != h_dash {
        return None;
    }
    Some(content)
}

/// Verify the CA certificate under the EU root key, extract the embedded
/// member-state key, and verify the card certificate under it.
pub fn verify_chain(ca_data: &[u8], card_data: &[u8]) -> Result<(), CertificateError> {
    verify_chain_with_root(ca_data, card_data, &EU_RSA_N, &EU_RSA_E)
}

fn verify_chain_with_root(
    ca_data: &[u8],
    card_data: &[u8],
    root_n: &[u8],
    root_e: &[u8],
) -> Result<(), CertificateError> {
    if ca_data.len() < CERTIFICATE_LEN || card_data.len() < CERTIFICATE_LEN {
        return Err(CertificateError::DataTruncated);
    }
    let ca_content =
        verify_certificate(ca_data, root_n, root_e).ok_or(CertificateError::CaCertificateInvalid)?;
    let member_key_n = ca_content
        .get(28..156)
        .ok_or(CertificateError::MemberKeyInvalid)?;
    let member_key_e = ca_content
        .get(156..164)
        .ok_or(CertificateError::MemberKeyInvalid)?;
    verify_certificate(card_data, member_key_n, member_key_e)
        .ok_or(CertificateError::CardCertificateInvalid)?;
    Ok(())
}
