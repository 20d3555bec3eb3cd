//! Forward passes through a (trained) visual question answering model

use super::processor::Encoding;
use crate::error::{Error, Result};
use anyhow::Context;
use std::fmt::Debug;
use std::path::Path;
use tch::{no_grad, CModule, Device, IValue, Tensor};

/// Anything that scores every answer label for an encoded question/image pair.
///
/// Implementations are shared read-only between concurrent requests.
pub trait Model: Send + Sync + Debug {
    /// Raw scores, `[1, num_labels]`
    fn logits(&self, encoding: &Encoding) -> Result<Tensor>;
}

/// A TorchScript export of `ViltForQuestionAnswering`.
///
/// The module's `forward` takes `(input_ids, attention_mask, token_type_ids,
/// pixel_values, pixel_mask)` and returns the logits either bare, as the
/// first element of a tuple (traced with `torchscript=True`), or under the
/// `logits` key of a dict.
#[derive(Debug)]
pub struct TorchModel {
    /// The loaded torch model
    module: CModule,
    device: Device,
}

impl TorchModel {
    pub fn load(path: &Path, device: Device) -> anyhow::Result<Self> {
        let mut module = CModule::load_on_device(path, device)
            .with_context(|| format!("failed to load TorchScript module {}", path.display()))?;
        module.set_eval();
        Ok(TorchModel { module, device })
    }
}

impl Model for TorchModel {
    fn logits(&self, encoding: &Encoding) -> Result<Tensor> {
        let inputs = [
            &encoding.input_ids,
            &encoding.attention_mask,
            &encoding.token_type_ids,
            &encoding.pixel_values,
            &encoding.pixel_mask,
        ]
        .map(|t| IValue::Tensor(t.to_device(self.device)));

        let output = no_grad(|| self.module.forward_is(&inputs))?;
        extract_logits(output)
    }
}

/// Pull the logits tensor out of whatever the module returned
fn extract_logits(output: IValue) -> Result<Tensor> {
    let logits = match output {
        IValue::Tensor(t) => Some(t),
        IValue::Tuple(values) | IValue::GenericList(values) => {
            values.into_iter().next().and_then(|v| match v {
                IValue::Tensor(t) => Some(t),
                _ => None,
            })
        }
        IValue::GenericDict(entries) => entries
            .into_iter()
            .find(|(key, _)| matches!(key, IValue::String(s) if s == "logits"))
            .and_then(|(_, v)| match v {
                IValue::Tensor(t) => Some(t),
                _ => None,
            }),
        _ => None,
    };

    logits.ok_or_else(|| Error::Inference("model output does not contain a logits tensor".into()))
}
