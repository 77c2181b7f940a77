//! Signature assembly
//!
//! The account contract verifies signatures in a fixed order:
//! ward primary, ward second factor, guardian primary, guardian second factor.
//! Every function here is pure; nothing touches the network or the store.

pub mod resource_bounds;

pub use resource_bounds::{GasAllowance, ResourceBound, ResourceBounds};

use crate::approval::ApprovalRequest;
use crate::felt::Felt;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An `(r, s)` ECDSA signature.
///
/// Debug output is redacted; signatures never reach the logs.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<String>", try_from = "Vec<String>")]
pub struct SignaturePair {
    pub r: Felt,
    pub s: Felt,
}

impl SignaturePair {
    pub fn new(r: Felt, s: Felt) -> Self {
        Self { r, s }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<SignaturePair> for Vec<String> {
    fn from(sig: SignaturePair) -> Self {
        vec![sig.r.to_hex(), sig.s.to_hex()]
    }
}

impl TryFrom<Vec<String>> for SignaturePair {
    type Error = Error;

    fn try_from(parts: Vec<String>) -> Result<Self> {
        match parts.as_slice() {
            [r, s] => Ok(Self::new(Felt::from_hex(r)?, Felt::from_hex(s)?)),
            _ => Err(Error::InvalidArgument(format!(
                "Signature must have exactly 2 elements, got {}",
                parts.len()
            ))),
        }
    }
}

impl fmt::Debug for SignaturePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SignaturePair([REDACTED])")
    }
}

/// Final ordered signature array handed to the chain.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssembledSignature(Vec<Felt>);

impl AssembledSignature {
    pub fn as_felts(&self) -> &[Felt] {
        &self.0
    }

    pub fn into_felts(self) -> Vec<Felt> {
        self.0
    }

    /// Number of `(r, s)` segments.
    pub fn segments(&self) -> usize {
        self.0.len() / 2
    }
}

impl fmt::Debug for AssembledSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssembledSignature({} segments)", self.segments())
    }
}

/// Concatenate signature segments in verifier order.
pub fn assemble_segments(
    ward: &SignaturePair,
    ward_second: Option<&SignaturePair>,
    guardian: Option<&SignaturePair>,
    guardian_second: Option<&SignaturePair>,
) -> AssembledSignature {
    let mut felts = Vec::with_capacity(8);
    for pair in std::iter::once(ward)
        .chain(ward_second)
        .chain(guardian)
        .chain(guardian_second)
    {
        felts.push(pair.r);
        felts.push(pair.s);
    }
    AssembledSignature(felts)
}

/// Build the full signature for a request from its stored ward segments and
/// the guardian segments supplied by the caller.
///
/// Fails when a segment the request requires is missing, or when a segment
/// is supplied that the request does not call for.
pub fn assemble(
    request: &ApprovalRequest,
    guardian: Option<&SignaturePair>,
    guardian_second: Option<&SignaturePair>,
) -> Result<AssembledSignature> {
    let ward = request
        .ward_signature()?
        .ok_or_else(|| Error::InvalidArgument("ward signature missing".to_string()))?;
    let ward_second = request.ward_second_signature()?;

    if request.needs_ward_2fa && ward_second.is_none() {
        return Err(Error::InvalidArgument(
            "ward second-factor signature missing".to_string(),
        ));
    }
    if !request.needs_ward_2fa && ward_second.is_some() {
        return Err(Error::InvalidArgument(
            "unexpected ward second-factor signature".to_string(),
        ));
    }
    match (request.needs_guardian, guardian) {
        (true, None) => {
            return Err(Error::InvalidArgument(
                "guardian signature missing".to_string(),
            ))
        }
        (false, Some(_)) => {
            return Err(Error::InvalidArgument(
                "unexpected guardian signature".to_string(),
            ))
        }
        _ => {}
    }
    let guardian_2fa_needed = request.needs_guardian && request.needs_guardian_2fa;
    match (guardian_2fa_needed, guardian_second) {
        (true, None) => {
            return Err(Error::InvalidArgument(
                "guardian second-factor signature missing".to_string(),
            ))
        }
        (false, Some(_)) => {
            return Err(Error::InvalidArgument(
                "unexpected guardian second-factor signature".to_string(),
            ))
        }
        _ => {}
    }

    Ok(assemble_segments(
        &ward,
        ward_second.as_ref(),
        guardian,
        guardian_second,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::test_support::sample_request;

    fn sig(tag: u64) -> SignaturePair {
        SignaturePair::new(Felt::from(tag), Felt::from(tag + 1))
    }

    #[test]
    fn ward_only_is_one_segment() {
        let mut request = sample_request();
        request.needs_guardian = false;
        request.ward_sig_json = Some(sig(10).to_json().unwrap());

        let assembled = assemble(&request, None, None).unwrap();
        assert_eq!(assembled.segments(), 1);
        assert_eq!(assembled.as_felts(), &[Felt::from(10u64), Felt::from(11u64)]);
    }

    #[test]
    fn full_ordering_ward_block_before_guardian_block() {
        let mut request = sample_request();
        request.needs_guardian = true;
        request.needs_ward_2fa = true;
        request.needs_guardian_2fa = true;
        request.ward_sig_json = Some(sig(10).to_json().unwrap());
        request.ward_2fa_sig_json = Some(sig(20).to_json().unwrap());

        let assembled = assemble(&request, Some(&sig(30)), Some(&sig(40))).unwrap();
        let expected: Vec<Felt> = [10u64, 11, 20, 21, 30, 31, 40, 41]
            .into_iter()
            .map(Felt::from)
            .collect();
        assert_eq!(assembled.as_felts(), expected.as_slice());
        assert_eq!(assembled.segments(), 4);
    }

    #[test]
    fn assembly_is_deterministic() {
        let mut request = sample_request();
        request.needs_guardian = true;
        request.ward_sig_json = Some(sig(1).to_json().unwrap());

        let a = assemble(&request, Some(&sig(5)), None).unwrap();
        let b = assemble(&request, Some(&sig(5)), None).unwrap();
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[test]
    fn missing_required_segments_fail() {
        let mut request = sample_request();
        request.needs_guardian = true;
        request.needs_ward_2fa = true;
        request.ward_sig_json = Some(sig(1).to_json().unwrap());

        // ward 2FA missing
        assert!(assemble(&request, Some(&sig(5)), None).is_err());

        request.ward_2fa_sig_json = Some(sig(2).to_json().unwrap());
        // guardian missing
        assert!(assemble(&request, None, None).is_err());
        // guardian 2FA supplied but not required
        assert!(assemble(&request, Some(&sig(5)), Some(&sig(6))).is_err());
        assert!(assemble(&request, Some(&sig(5)), None).is_ok());
    }

    #[test]
    fn signature_pair_wire_and_debug() {
        let pair = sig(0xab);
        assert_eq!(pair.to_json().unwrap(), r#"["0xab","0xac"]"#);
        assert_eq!(SignaturePair::from_json(r#"["0xab","0xac"]"#).unwrap(), pair);
        assert!(SignaturePair::from_json(r#"["0x1"]"#).is_err());
        assert!(!format!("{:?}", pair).contains("0xab"));
    }
}
