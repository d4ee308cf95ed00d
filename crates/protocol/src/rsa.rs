//! RSA session opening
//!
//! The login packet carries one 128-byte RSA block holding the XTEA key,
//! session token and challenge echo. The client encrypts it raw (no padding
//! scheme), so the private-key operation here is a bare modular
//! exponentiation. Key loading is the embedder's concern; the gateway only
//! receives the modulus and private exponent.

use num_bigint::BigUint;
use otgate_core::{GatewayError, Result};

/// Size of the RSA block in the login packet (1024-bit modulus).
pub const RSA_BUFFER_LENGTH: usize = 128;

pub struct RsaDecryptor {
    n: BigUint,
    d: BigUint,
}

impl RsaDecryptor {
    pub fn new(n: BigUint, d: BigUint) -> Self {
        Self { n, d }
    }

    /// Construct from decimal strings, the format private keys are usually
    /// handed around in for this protocol family.
    pub fn from_decimal(n: &str, d: &str) -> Result<Self> {
        let parse = |s: &str, what: &str| {
            s.parse::<BigUint>()
                .map_err(|_| GatewayError::Crypto(format!("invalid RSA {what}")))
        };
        Ok(Self::new(parse(n, "modulus")?, parse(d, "exponent")?))
    }

    /// Open a 128-byte block in place. Fails on a wrong block size or a
    /// ciphertext not below the modulus; the caller still has to verify the
    /// leading zero byte of the plaintext.
    pub fn decrypt_in_place(&self, block: &mut [u8]) -> Result<()> {
        if block.len() != RSA_BUFFER_LENGTH {
            return Err(GatewayError::Crypto(format!(
                "invalid RSA block length (expected {RSA_BUFFER_LENGTH}, got {})",
                block.len()
            )));
        }

        let c = BigUint::from_bytes_be(block);
        if c >= self.n {
            return Err(GatewayError::Crypto("RSA block exceeds modulus".into()));
        }

        let m = c.modpow(&self.d, &self.n);
        let bytes = m.to_bytes_be();
        block.fill(0);
        block[RSA_BUFFER_LENGTH - bytes.len()..].copy_from_slice(&bytes);
        Ok(())
    }
}

/// Public-key half, used by tests and tooling to produce blocks the
/// decryptor can open.
pub struct RsaEncryptor {
    n: BigUint,
    e: BigUint,
}

impl RsaEncryptor {
    pub fn new(n: BigUint, e: BigUint) -> Self {
        Self { n, e }
    }

    pub fn encrypt_in_place(&self, block: &mut [u8]) -> Result<()> {
        if block.len() != RSA_BUFFER_LENGTH {
            return Err(GatewayError::Crypto(format!(
                "invalid RSA block length (expected {RSA_BUFFER_LENGTH}, got {})",
                block.len()
            )));
        }

        let m = BigUint::from_bytes_be(block);
        if m >= self.n {
            return Err(GatewayError::Crypto("RSA block exceeds modulus".into()));
        }

        let c = m.modpow(&self.e, &self.n);
        let bytes = c.to_bytes_be();
        block.fill(0);
        block[RSA_BUFFER_LENGTH - bytes.len()..].copy_from_slice(&bytes);
        Ok(())
    }
}

pub mod dev_keys {
    //! The well-known 1024-bit development keypair of this protocol family,
    //! for tests and local tooling. Never deploy it.

    use super::*;

    const P: &str = "14299623962416399520070177382898895550795403345466153217470516082934737582776038882967213386204600674145392845853859217990626450972452084065728686565928113";
    const Q: &str = "7630979195970404721891201847792002125535401292779123937207447574596692788513647179235335529307251350570728407373705564708871762033017096809910315212884101";
    const D: &str = "46730330223584118622160180015036832148732986808519344675210555262940258739805766860224610646919605860206328024326703361630109888417839241959507572247284807035235569619173792292786907845791904955103601652822519121908367187885509270025388641700821735345222087940578381210879116823013776808975766851829020659073";

    pub fn keypair() -> (RsaEncryptor, RsaDecryptor) {
        let p: BigUint = P.parse().expect("valid prime literal");
        let q: BigUint = Q.parse().expect("valid prime literal");
        let n = &p * &q;
        let e = BigUint::from(65537u32);
        let d: BigUint = D.parse().expect("valid exponent literal");
        (RsaEncryptor::new(n.clone(), e), RsaDecryptor::new(n, d))
    }
}
