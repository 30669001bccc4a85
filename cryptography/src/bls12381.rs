//! Production [Scheme] backend over BLS12-381 (min_pk).
//!
//! Public keys live in G1 (48 bytes compressed), signatures in G2
//! (96 bytes compressed). Partial signatures over the same message
//! aggregate by group addition, so a multi-signature is a single G2
//! element verified against the contributing public keys with a fast
//! aggregate verification.

use blst::min_pk::{AggregateSignature, PublicKey as G1, SecretKey, Signature as G2};
use blst::BLST_ERROR;
use rand::{CryptoRng, RngCore, SeedableRng};

use crate::{union_unique, Error, Scheme};

/// Domain separation tag for the hash-to-curve, per the BLS signature
/// draft (basic scheme, G2 signatures).
const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

/// A compressed G1 public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; 48]);

impl PublicKey {
    fn decode(&self) -> Result<G1, Error> {
        let key = G1::from_bytes(&self.0).map_err(|_| Error::InvalidPublicKey)?;
        key.validate().map_err(|_| Error::InvalidPublicKey)?;
        Ok(key)
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..")
    }
}

/// A compressed G2 signature (partial or combined, both are single
/// group elements under this scheme).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature([u8; 96]);

impl Signature {
    fn decode(&self) -> Result<G2, Error> {
        G2::from_bytes(&self.0).map_err(|_| Error::MalformedSignature)
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..")
    }
}

/// A participant's BLS12-381 key material.
#[derive(Clone)]
pub struct Bls12381 {
    secret: SecretKey,
    public: PublicKey,
}

impl Bls12381 {
    /// Generate fresh key material from the provided randomness.
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut ikm = [0u8; 32];
        rng.fill_bytes(&mut ikm);
        let secret = SecretKey::key_gen(&ikm, &[]).expect("ikm is 32 bytes");
        let public = PublicKey(secret.sk_to_pk().to_bytes());
        Self { secret, public }
    }

    /// Generate key material from a seed. Only useful for testing.
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        Self::new(&mut rng)
    }
}

impl Scheme for Bls12381 {
    type PublicKey = PublicKey;
    type PartialSignature = Signature;
    type MultiSignature = Signature;

    fn public_key(&self) -> PublicKey {
        self.public
    }

    fn sign(&self, namespace: &[u8], message: &[u8]) -> Signature {
        let payload = union_unique(namespace, message);
        Signature(self.secret.sign(&payload, DST, &[]).to_bytes())
    }

    fn verify(
        public_key: &PublicKey,
        namespace: &[u8],
        message: &[u8],
        partial: &Signature,
    ) -> Result<(), Error> {
        let key = public_key.decode()?;
        let signature = partial.decode()?;
        let payload = union_unique(namespace, message);
        match signature.verify(true, &payload, DST, &[], &key, false) {
            BLST_ERROR::BLST_SUCCESS => Ok(()),
            _ => Err(Error::InvalidPartialSignature),
        }
    }

    fn combine<'a, I>(partials: I) -> Result<Signature, Error>
    where
        I: IntoIterator<Item = &'a Signature>,
    {
        let decoded = partials
            .into_iter()
            .map(Signature::decode)
            .collect::<Result<Vec<_>, _>>()?;
        if decoded.is_empty() {
            return Err(Error::NothingToCombine);
        }
        let refs: Vec<&G2> = decoded.iter().collect();
        let combined = AggregateSignature::aggregate(&refs, false)
            .map_err(|_| Error::MalformedSignature)?;
        Ok(Signature(combined.to_signature().to_bytes()))
    }

    fn verify_multi<'a, I>(
        public_keys: I,
        namespace: &[u8],
        message: &[u8],
        multi: &Signature,
    ) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'a PublicKey>,
    {
        let decoded = public_keys
            .into_iter()
            .map(PublicKey::decode)
            .collect::<Result<Vec<_>, _>>()?;
        if decoded.is_empty() {
            return Err(Error::InvalidMultiSignature);
        }
        let refs: Vec<&G1> = decoded.iter().collect();
        let signature = multi.decode()?;
        let payload = union_unique(namespace, message);
        match signature.fast_aggregate_verify(true, &payload, DST, &refs) {
            BLST_ERROR::BLST_SUCCESS => Ok(()),
            _ => Err(Error::InvalidMultiSignature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const NAMESPACE: &[u8] = b"_PALISADE_TEST";

    #[test]
    fn test_sign_verify() {
        let signer = Bls12381::from_seed(0);
        let signature = signer.sign(NAMESPACE, b"state root");
        Bls12381::verify(&signer.public_key(), NAMESPACE, b"state root", &signature)
            .expect("signature should verify");

        // Wrong message
        assert!(
            Bls12381::verify(&signer.public_key(), NAMESPACE, b"other", &signature).is_err()
        );

        // Wrong namespace
        assert!(
            Bls12381::verify(&signer.public_key(), b"_OTHER", b"state root", &signature)
                .is_err()
        );

        // Wrong key
        let other = Bls12381::from_seed(1);
        assert!(
            Bls12381::verify(&other.public_key(), NAMESPACE, b"state root", &signature)
                .is_err()
        );
    }

    #[test_case(1; "single signer")]
    #[test_case(3; "quorum of a small pool")]
    #[test_case(7; "quorum of a larger pool")]
    fn test_combine_verify_multi(n: u64) {
        let signers: Vec<_> = (0..n).map(Bls12381::from_seed).collect();
        let partials: Vec<_> = signers
            .iter()
            .map(|s| s.sign(NAMESPACE, b"state root"))
            .collect();
        let multi = Bls12381::combine(partials.iter()).unwrap();
        let keys: Vec<_> = signers.iter().map(|s| s.public_key()).collect();
        Bls12381::verify_multi(keys.iter(), NAMESPACE, b"state root", &multi)
            .expect("multi-signature should verify");

        // Missing a contributor's key fails verification.
        if n > 1 {
            let missing = &keys[..keys.len() - 1];
            assert!(
                Bls12381::verify_multi(missing.iter(), NAMESPACE, b"state root", &multi)
                    .is_err()
            );

            // A partial standing in for the combination fails verification.
            assert!(
                Bls12381::verify_multi(keys.iter(), NAMESPACE, b"state root", &partials[0])
                    .is_err()
            );
        }
    }

    #[test]
    fn test_combine_empty() {
        assert!(matches!(
            Bls12381::combine(std::iter::empty()),
            Err(Error::NothingToCombine)
        ));
    }

    #[test]
    fn test_tampered_multi() {
        let signers: Vec<_> = (0..3).map(Bls12381::from_seed).collect();
        let partials: Vec<_> = signers
            .iter()
            .map(|s| s.sign(NAMESPACE, b"state root"))
            .collect();
        let multi = Bls12381::combine(partials.iter()).unwrap();
        let keys: Vec<_> = signers.iter().map(|s| s.public_key()).collect();

        // Swap in a combination over a different message.
        let forged: Vec<_> = signers.iter().map(|s| s.sign(NAMESPACE, b"forged")).collect();
        let forged = Bls12381::combine(forged.iter()).unwrap();
        assert_ne!(multi, forged);
        assert!(
            Bls12381::verify_multi(keys.iter(), NAMESPACE, b"state root", &forged).is_err()
        );
    }
}
