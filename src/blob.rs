//! Opaque, versioned (de)serialization of compiled templates, for
//! attaching to sequence assets. The byte layout is an implementation
//! detail; the contract is round-trip fidelity plus a version tag for
//! forward migration.

use crate::{
    error::{PlayfieldError, PlayfieldResult},
    template::EvaluationTemplate,
};

pub const TEMPLATE_BLOB_VERSION: u32 = 1;

#[derive(serde::Serialize, serde::Deserialize)]
struct TemplateBlob {
    version: u32,
    template: EvaluationTemplate,
}

pub fn encode_template(template: &EvaluationTemplate) -> PlayfieldResult<Vec<u8>> {
    bincode::serialize(&TemplateBlob {
        version: TEMPLATE_BLOB_VERSION,
        template: template.clone(),
    })
    .map_err(|e| PlayfieldError::serde(format!("encode template blob: {e}")))
}

pub fn decode_template(bytes: &[u8]) -> PlayfieldResult<EvaluationTemplate> {
    let blob: TemplateBlob = bincode::deserialize(bytes)
        .map_err(|e| PlayfieldError::serde(format!("decode template blob: {e}")))?;
    if blob.version != TEMPLATE_BLOB_VERSION {
        return Err(PlayfieldError::serde(format!(
            "unsupported template blob version {} (expected {})",
            blob.version, TEMPLATE_BLOB_VERSION
        )));
    }
    Ok(blob.template)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_mismatch_is_rejected() {
        let bytes = bincode::serialize(&TemplateBlob {
            version: TEMPLATE_BLOB_VERSION + 1,
            template: EvaluationTemplate::new(),
        })
        .unwrap();
        let err = decode_template(&bytes).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn empty_template_round_trips() {
        let template = EvaluationTemplate::new();
        let bytes = encode_template(&template).unwrap();
        assert_eq!(decode_template(&bytes).unwrap(), template);
    }
}
