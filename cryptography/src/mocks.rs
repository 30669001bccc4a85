//! Deterministic fakes for testing.

use crate::{union_unique, Digest, Error, Scheme};

/// An insecure [Scheme] with the same algebra as the production backend:
/// partials over the same message combine order-independently, and the
/// combination verifies only against the exact contributing key set.
///
/// A "signature" is a hash binding signer and payload, and a combination
/// is the xor-fold of its partials. Trivially forgeable; tests only.
#[derive(Clone, Debug)]
pub struct Insecure {
    id: u32,
}

impl Insecure {
    pub fn new(id: u32) -> Self {
        Self { id }
    }

    fn tag(id: u32, namespace: &[u8], message: &[u8]) -> Digest {
        let payload = union_unique(namespace, message);
        Digest::hash(&union_unique(&id.to_be_bytes(), &payload))
    }
}

/// A partial signature produced by [Insecure].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Partial {
    signer: u32,
    tag: Digest,
}

/// A combined signature produced by [Insecure].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Multi {
    tag: [u8; 32],
}

impl Scheme for Insecure {
    type PublicKey = u32;
    type PartialSignature = Partial;
    type MultiSignature = Multi;

    fn public_key(&self) -> u32 {
        self.id
    }

    fn sign(&self, namespace: &[u8], message: &[u8]) -> Partial {
        Partial {
            signer: self.id,
            tag: Self::tag(self.id, namespace, message),
        }
    }

    fn verify(
        public_key: &u32,
        namespace: &[u8],
        message: &[u8],
        partial: &Partial,
    ) -> Result<(), Error> {
        if partial.signer != *public_key
            || partial.tag != Self::tag(*public_key, namespace, message)
        {
            return Err(Error::InvalidPartialSignature);
        }
        Ok(())
    }

    fn combine<'a, I>(partials: I) -> Result<Multi, Error>
    where
        I: IntoIterator<Item = &'a Partial>,
    {
        let mut tag = [0u8; 32];
        let mut any = false;
        for partial in partials {
            any = true;
            for (acc, byte) in tag.iter_mut().zip(partial.tag.0.iter()) {
                *acc ^= byte;
            }
        }
        if !any {
            return Err(Error::NothingToCombine);
        }
        Ok(Multi { tag })
    }

    fn verify_multi<'a, I>(
        public_keys: I,
        namespace: &[u8],
        message: &[u8],
        multi: &Multi,
    ) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'a u32>,
    {
        let mut expected = [0u8; 32];
        let mut any = false;
        for key in public_keys {
            any = true;
            let tag = Self::tag(*key, namespace, message);
            for (acc, byte) in expected.iter_mut().zip(tag.0.iter()) {
                *acc ^= byte;
            }
        }
        if !any || expected != multi.tag {
            return Err(Error::InvalidMultiSignature);
        }
        Ok(())
    }
}
