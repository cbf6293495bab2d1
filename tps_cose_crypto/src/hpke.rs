/***************************************************************************************************
 * Copyright (c) 2022-2023 Jeremy O'Donoghue. All rights reserved.
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy of this software
 * and associated documentation files (the “Software”), to deal in the Software without
 * restriction, including without limitation the rights to use, copy, modify, merge, publish,
 * distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the
 * Software is furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice (including the next
 * paragraph) shall be included in all copies or substantial portions of the
 * Software.
 *
 * THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
 * BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
 * NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
 * DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.
 **************************************************************************************************/
/***************************************************************************************************
 * HPKE base mode single-shot (RFC 9180)
 *
 * DHKEM(P-256, HKDF-SHA256), HKDF-SHA256, AES-128-GCM, composed from the same p256/hkdf/aes-gcm
 * stack as the rest of the adapter. Only the single-shot, sequence-number-zero operation COSE
 * recipients need.
 **************************************************************************************************/
use aes_gcm::aead::AeadInPlace;
use aes_gcm::{AesGcm, KeyInit, Nonce, Tag};
use hkdf::Hkdf;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;
use sha2::Sha256;

use tps_minicose::error::{CoseError, Result};

type Aes128Gcm = AesGcm<aes::Aes128, aes_gcm::aead::consts::U12>;

// KEM 0x0010 = DHKEM(P-256, HKDF-SHA256); KDF 0x0001 = HKDF-SHA256; AEAD 0x0001 = AES-128-GCM
const SUITE_ID_KEM: &[u8] = &[b'K', b'E', b'M', 0x00, 0x10];
const SUITE_ID_HPKE: &[u8] = &[b'H', b'P', b'K', b'E', 0x00, 0x10, 0x00, 0x01, 0x00, 0x01];

const N_SECRET: usize = 32;
const N_KEY: usize = 16;
const N_NONCE: usize = 12;
const N_TAG: usize = 16;
const N_ENC: usize = 65;

fn labeled_extract(suite_id: &[u8], salt: &[u8], label: &[u8], ikm: &[u8]) -> [u8; 32] {
    let mut labeled_ikm = Vec::with_capacity(7 + suite_id.len() + label.len() + ikm.len());
    labeled_ikm.extend_from_slice(b"HPKE-v1");
    labeled_ikm.extend_from_slice(suite_id);
    labeled_ikm.extend_from_slice(label);
    labeled_ikm.extend_from_slice(ikm);
    let salt = if salt.is_empty() { None } else { Some(salt) };
    let (prk, _) = Hkdf::<Sha256>::extract(salt, &labeled_ikm);
    prk.into()
}

fn labeled_expand(
    suite_id: &[u8],
    prk: &[u8; 32],
    label: &[u8],
    info: &[u8],
    out: &mut [u8],
) -> Result<()> {
    let mut labeled_info = Vec::with_capacity(9 + suite_id.len() + label.len() + info.len());
    labeled_info.extend_from_slice(&(out.len() as u16).to_be_bytes());
    labeled_info.extend_from_slice(b"HPKE-v1");
    labeled_info.extend_from_slice(suite_id);
    labeled_info.extend_from_slice(label);
    labeled_info.extend_from_slice(info);
    Hkdf::<Sha256>::from_prk(prk)
        .map_err(|_| CoseError::CryptoFailed)?
        .expand(&labeled_info, out)
        .map_err(|_| CoseError::CryptoFailed)
}

/// DHKEM ExtractAndExpand: shared secret from the raw Diffie-Hellman output and the KEM context.
fn extract_and_expand(dh: &[u8], kem_context: &[u8]) -> Result<[u8; N_SECRET]> {
    let eae_prk = labeled_extract(SUITE_ID_KEM, &[], b"eae_prk", dh);
    let mut shared = [0u8; N_SECRET];
    labeled_expand(SUITE_ID_KEM, &eae_prk, b"shared_secret", kem_context, &mut shared)?;
    Ok(shared)
}

/// KeySchedule for base mode: derive the AEAD key and base nonce.
fn key_schedule(shared_secret: &[u8; N_SECRET], info: &[u8]) -> Result<([u8; N_KEY], [u8; N_NONCE])> {
    let psk_id_hash = labeled_extract(SUITE_ID_HPKE, &[], b"psk_id_hash", &[]);
    let info_hash = labeled_extract(SUITE_ID_HPKE, &[], b"info_hash", info);

    let mut context = [0u8; 1 + 32 + 32];
    context[0] = 0x00; // mode_base
    context[1..33].copy_from_slice(&psk_id_hash);
    context[33..65].copy_from_slice(&info_hash);

    let secret = labeled_extract(SUITE_ID_HPKE, shared_secret, b"secret", &[]);

    let mut key = [0u8; N_KEY];
    labeled_expand(SUITE_ID_HPKE, &secret, b"key", &context, &mut key)?;
    let mut base_nonce = [0u8; N_NONCE];
    labeled_expand(SUITE_ID_HPKE, &secret, b"base_nonce", &context, &mut base_nonce)?;
    Ok((key, base_nonce))
}

/// Single-shot base-mode seal. Writes the encapsulated key and ciphertext, returning both sizes.
pub(crate) fn seal(
    peer_public: &[u8],
    info: &[u8],
    aad: &[u8],
    plaintext: &[u8],
    enc_out: &mut [u8],
    ct_out: &mut [u8],
) -> Result<(usize, usize)> {
    let pk_r = p256::PublicKey::from_sec1_bytes(peer_public)
        .map_err(|_| CoseError::KeyImportFailed)?;
    let pk_rm = pk_r.to_encoded_point(false);

    let sk_e = p256::SecretKey::random(&mut OsRng);
    let enc_point = sk_e.public_key().to_encoded_point(false);
    let enc = enc_point.as_bytes();

    let dh = p256::ecdh::diffie_hellman(sk_e.to_nonzero_scalar(), pk_r.as_affine());

    let mut kem_context = Vec::with_capacity(2 * N_ENC);
    kem_context.extend_from_slice(enc);
    kem_context.extend_from_slice(pk_rm.as_bytes());
    let shared_secret = extract_and_expand(dh.raw_secret_bytes(), &kem_context)?;

    let (key, base_nonce) = key_schedule(&shared_secret, info)?;

    let ct_len = plaintext.len() + N_TAG;
    if enc_out.len() < enc.len() || ct_out.len() < ct_len {
        return Err(CoseError::BufferTooSmall);
    }
    ct_out[..plaintext.len()].copy_from_slice(plaintext);
    let cipher = Aes128Gcm::new_from_slice(&key).map_err(|_| CoseError::KeyImportFailed)?;
    let tag = cipher
        .encrypt_in_place_detached(
            Nonce::from_slice(&base_nonce),
            aad,
            &mut ct_out[..plaintext.len()],
        )
        .map_err(|_| CoseError::CryptoFailed)?;
    ct_out[plaintext.len()..ct_len].copy_from_slice(&tag);

    enc_out[..enc.len()].copy_from_slice(enc);
    Ok((enc.len(), ct_len))
}

/// Single-shot base-mode open. Returns the plaintext size.
pub(crate) fn open(
    own_private: &[u8],
    enc: &[u8],
    info: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    pt_out: &mut [u8],
) -> Result<usize> {
    if ciphertext.len() < N_TAG {
        return Err(CoseError::AuthenticationFailed);
    }
    let sk_r =
        p256::SecretKey::from_slice(own_private).map_err(|_| CoseError::KeyImportFailed)?;
    let pk_e = p256::PublicKey::from_sec1_bytes(enc).map_err(|_| CoseError::KeyImportFailed)?;
    let pk_rm = sk_r.public_key().to_encoded_point(false);

    let dh = p256::ecdh::diffie_hellman(sk_r.to_nonzero_scalar(), pk_e.as_affine());

    let mut kem_context = Vec::with_capacity(2 * N_ENC);
    kem_context.extend_from_slice(enc);
    kem_context.extend_from_slice(pk_rm.as_bytes());
    let shared_secret = extract_and_expand(dh.raw_secret_bytes(), &kem_context)?;

    let (key, base_nonce) = key_schedule(&shared_secret, info)?;

    let pt_len = ciphertext.len() - N_TAG;
    if pt_out.len() < pt_len {
        return Err(CoseError::BufferTooSmall);
    }
    pt_out[..pt_len].copy_from_slice(&ciphertext[..pt_len]);
    let cipher = Aes128Gcm::new_from_slice(&key).map_err(|_| CoseError::KeyImportFailed)?;
    let tag = Tag::<aes_gcm::aead::consts::U16>::clone_from_slice(&ciphertext[pt_len..]);
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&base_nonce),
            aad,
            &mut pt_out[..pt_len],
            &tag,
        )
        .map_err(|_| CoseError::AuthenticationFailed)?;
    Ok(pt_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() -> Result<()> {
        let sk_r = p256::SecretKey::random(&mut OsRng);
        let pk_r = sk_r.public_key().to_encoded_point(false);

        let mut enc = [0u8; N_ENC];
        let mut ct = [0u8; 64];
        let (enc_len, ct_len) = seal(
            pk_r.as_bytes(),
            b"info",
            b"aad",
            b"0123456789abcdef",
            &mut enc,
            &mut ct,
        )?;
        assert_eq!(enc_len, N_ENC);
        assert_eq!(ct_len, 16 + N_TAG);

        let mut pt = [0u8; 64];
        let n = open(
            &sk_r.to_bytes(),
            &enc[..enc_len],
            b"info",
            b"aad",
            &ct[..ct_len],
            &mut pt,
        )?;
        assert_eq!(&pt[..n], b"0123456789abcdef");

        // wrong info must fail authentication
        let r = open(
            &sk_r.to_bytes(),
            &enc[..enc_len],
            b"other",
            b"aad",
            &ct[..ct_len],
            &mut pt,
        );
        assert!(r.is_err());
        Ok(())
    }
}
