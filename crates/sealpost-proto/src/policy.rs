//! Policy descriptor carried inside the header.
//!
//! The engine never interprets policy content. It is parsed only far enough
//! to find where the ephemeral key starts, then handed to subscribers as the
//! exact bytes that arrived.

use bytes::BufMut;

use crate::{
    ResourceLocator,
    errors::{ProtocolError, Result},
    reader::Reader,
};

/// Policy type byte values.
const POLICY_REMOTE: u8 = 0x00;
const POLICY_EMBEDDED_PLAINTEXT: u8 = 0x01;
const POLICY_EMBEDDED_ENCRYPTED: u8 = 0x02;

/// Where the policy lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PolicyBody {
    /// Policy is fetched from a remote locator.
    Remote(ResourceLocator),
    /// Policy travels inside the header.
    Embedded {
        /// Content is encrypted under the payload key.
        encrypted: bool,
        /// Raw policy content (at most 65535 bytes).
        content: Vec<u8>,
    },
}

/// Policy body plus its binding (ECDSA signature or GMAC tag).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Policy {
    body: PolicyBody,
    binding: Vec<u8>,
}

impl Policy {
    /// Build a policy.
    ///
    /// The binding length is checked against the header's binding mode in
    /// [`crate::Header::new`].
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidLength` if embedded content exceeds 65535 bytes
    pub fn new(body: PolicyBody, binding: impl Into<Vec<u8>>) -> Result<Self> {
        if let PolicyBody::Embedded { content, .. } = &body
            && content.len() > u16::MAX as usize
        {
            let len = content.len();
            return Err(ProtocolError::InvalidLength { field: "policy content", len });
        }
        Ok(Self { body, binding: binding.into() })
    }

    /// Policy body.
    pub fn body(&self) -> &PolicyBody {
        &self.body
    }

    /// Policy binding bytes.
    pub fn binding(&self) -> &[u8] {
        &self.binding
    }

    /// Serialized size in bytes.
    pub fn encoded_len(&self) -> usize {
        let body = match &self.body {
            PolicyBody::Remote(locator) => locator.encoded_len(),
            PolicyBody::Embedded { content, .. } => 2 + content.len(),
        };
        1 + body + self.binding.len()
    }

    /// Policy exactly as it appears on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode(&mut out);
        out
    }

    pub(crate) fn decode(r: &mut Reader<'_>, binding_len: usize) -> Result<Self> {
        let kind = r.u8("policy type")?;
        let body = match kind {
            POLICY_REMOTE => PolicyBody::Remote(ResourceLocator::decode(r)?),
            POLICY_EMBEDDED_PLAINTEXT | POLICY_EMBEDDED_ENCRYPTED => {
                let len = r.u16("policy length")? as usize;
                let content = r.take(len, "policy content")?.to_vec();
                PolicyBody::Embedded { encrypted: kind == POLICY_EMBEDDED_ENCRYPTED, content }
            },
            other => return Err(ProtocolError::UnknownPolicyType(other)),
        };
        let binding = r.take(binding_len, "policy binding")?.to_vec();
        Ok(Self { body, binding })
    }

    pub(crate) fn encode(&self, dst: &mut impl BufMut) {
        match &self.body {
            PolicyBody::Remote(locator) => {
                dst.put_u8(POLICY_REMOTE);
                locator.encode(dst);
            },
            PolicyBody::Embedded { encrypted, content } => {
                let kind =
                    if *encrypted { POLICY_EMBEDDED_ENCRYPTED } else { POLICY_EMBEDDED_PLAINTEXT };
                dst.put_u8(kind);
                // INVARIANT: `new` and `decode` bound content to u16::MAX.
                dst.put_u16(content.len() as u16);
                dst.put_slice(content);
            },
        }
        dst.put_slice(&self.binding);
    }
}
