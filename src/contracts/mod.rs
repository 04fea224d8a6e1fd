use std::{fs, path::Path};

use ethers::abi::{Abi, ParamType};
use sha2::{Digest, Sha256};

use crate::error::BallotError;

pub const TOTAL_VOTES_FOR: &str = "totalVotesFor";
pub const VOTE_FOR_CANDIDATE: &str = "voteForCandidate";
pub const VALID_CANDIDATE: &str = "validCandidate";
pub const CANDIDATE_LIST: &str = "candidateList";
pub const CONTRACT_OWNER: &str = "contractOwner";

/// Expected shape of one contract function.
struct Signature {
    name: &'static str,
    inputs: &'static [ParamType],
    outputs: &'static [ParamType],
}

const BYTES32: ParamType = ParamType::FixedBytes(32);

const REQUIRED: &[Signature] = &[
    Signature {
        name: TOTAL_VOTES_FOR,
        inputs: &[BYTES32],
        outputs: &[ParamType::Uint(8)],
    },
    Signature {
        name: VOTE_FOR_CANDIDATE,
        inputs: &[BYTES32],
        outputs: &[],
    },
];

const OPTIONAL: &[Signature] = &[
    Signature {
        name: VALID_CANDIDATE,
        inputs: &[BYTES32],
        outputs: &[ParamType::Bool],
    },
    Signature {
        name: CANDIDATE_LIST,
        inputs: &[ParamType::Uint(256)],
        outputs: &[BYTES32],
    },
    Signature {
        name: CONTRACT_OWNER,
        inputs: &[],
        outputs: &[ParamType::Address],
    },
];

/// Validated ABI of the Voting contract.
#[derive(Clone, Debug)]
pub struct ContractInterface {
    abi: Abi,
    fingerprint: [u8; 32],
    optional: Vec<&'static str>,
}

impl ContractInterface {
    pub fn load(path: &Path) -> Result<Self, BallotError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            BallotError::Interface(format!("failed reading {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, BallotError> {
        let abi: Abi = serde_json::from_str(raw)
            .map_err(|e| BallotError::Interface(format!("malformed abi json: {e}")))?;

        for sig in REQUIRED {
            if !matches_signature(&abi, sig)? {
                return Err(BallotError::Interface(format!(
                    "function {} is missing",
                    sig.name
                )));
            }
        }
        let mut optional = Vec::new();
        for sig in OPTIONAL {
            if matches_signature(&abi, sig)? {
                optional.push(sig.name);
            }
        }

        Ok(Self {
            abi,
            fingerprint: Sha256::digest(raw.as_bytes()).into(),
            optional,
        })
    }

    pub fn abi(&self) -> &Abi {
        &self.abi
    }

    /// SHA-256 of the ABI text, for spotting a stale description in logs.
    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint)
    }

    pub fn supports(&self, name: &str) -> bool {
        REQUIRED.iter().any(|sig| sig.name == name) || self.optional.contains(&name)
    }

    pub fn require(&self, name: &'static str) -> Result<(), BallotError> {
        if self.supports(name) {
            Ok(())
        } else {
            Err(BallotError::Interface(format!(
                "contract does not expose {name}"
            )))
        }
    }
}

/// `Ok(false)` when the function is absent, an error when it exists with the wrong types.
fn matches_signature(abi: &Abi, sig: &Signature) -> Result<bool, BallotError> {
    let Some(overloads) = abi.functions.get(sig.name) else {
        return Ok(false);
    };
    let found = overloads.iter().any(|f| {
        f.inputs.iter().map(|p| &p.kind).eq(sig.inputs.iter())
            && f.outputs.iter().map(|p| &p.kind).eq(sig.outputs.iter())
    });
    if found {
        Ok(true)
    } else {
        Err(BallotError::Interface(format!(
            "function {} does not match ({}) -> ({})",
            sig.name,
            render(sig.inputs),
            render(sig.outputs)
        )))
    }
}

fn render(params: &[ParamType]) -> String {
    params
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOTING_ABI: &str = include_str!("../../abi/Voting.json");

    #[test]
    fn voting_abi_exposes_full_surface() {
        let iface = ContractInterface::from_json(VOTING_ABI).unwrap();
        for name in [
            TOTAL_VOTES_FOR,
            VOTE_FOR_CANDIDATE,
            VALID_CANDIDATE,
            CANDIDATE_LIST,
            CONTRACT_OWNER,
        ] {
            assert!(iface.supports(name), "{name} should be supported");
        }
        assert!(iface.require(CONTRACT_OWNER).is_ok());
        assert_eq!(iface.fingerprint_hex().len(), 64);
    }

    #[test]
    fn fingerprint_tracks_abi_text() {
        let a = ContractInterface::from_json(VOTING_ABI).unwrap();
        let b = ContractInterface::from_json(VOTING_ABI).unwrap();
        assert_eq!(a.fingerprint_hex(), b.fingerprint_hex());
        let reformatted = format!("{VOTING_ABI}\n");
        let c = ContractInterface::from_json(&reformatted).unwrap();
        assert_ne!(a.fingerprint_hex(), c.fingerprint_hex());
    }

    #[test]
    fn missing_required_function_is_rejected() {
        let abi = r#"[{"constant":false,"inputs":[{"name":"candidate","type":"bytes32"}],"name":"voteForCandidate","outputs":[],"payable":false,"type":"function"}]"#;
        let err = ContractInterface::from_json(abi).unwrap_err();
        assert!(err.to_string().contains(TOTAL_VOTES_FOR));
    }

    #[test]
    fn mistyped_function_is_rejected() {
        let abi = r#"[
            {"constant":true,"inputs":[{"name":"candidate","type":"string"}],"name":"totalVotesFor","outputs":[{"name":"","type":"uint8"}],"payable":false,"type":"function"},
            {"constant":false,"inputs":[{"name":"candidate","type":"bytes32"}],"name":"voteForCandidate","outputs":[],"payable":false,"type":"function"}
        ]"#;
        let err = ContractInterface::from_json(abi).unwrap_err();
        assert!(matches!(err, BallotError::Interface(_)));
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn optional_functions_gate_commands() {
        let abi = r#"[
            {"constant":true,"inputs":[{"name":"candidate","type":"bytes32"}],"name":"totalVotesFor","outputs":[{"name":"","type":"uint8"}],"payable":false,"type":"function"},
            {"constant":false,"inputs":[{"name":"candidate","type":"bytes32"}],"name":"voteForCandidate","outputs":[],"payable":false,"type":"function"}
        ]"#;
        let iface = ContractInterface::from_json(abi).unwrap();
        assert!(!iface.supports(CONTRACT_OWNER));
        assert!(iface.require(CANDIDATE_LIST).is_err());
    }

    #[test]
    fn malformed_json_is_an_interface_error() {
        assert!(matches!(
            ContractInterface::from_json("{not json"),
            Err(BallotError::Interface(_))
        ));
    }
}
