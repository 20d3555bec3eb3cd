//! Visual question answering: one question and one image in, one label out

use crate::config::ModelSettings;
use crate::error::{Error, Result};
use anyhow::Context;
use image::RgbImage;
use std::fmt;
use std::time::Instant;
use tch::Tensor;
use tracing::{debug, info};

pub mod labels;
pub mod model;
pub mod processor;

pub use labels::Labels;
pub use model::{Model, TorchModel};
pub use processor::{Encoding, Processor};

/// A label from the model's answer vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer(String);

impl Answer {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encoder, model and label vocabulary, loaded once and then only read
pub struct Pipeline {
    processor: Processor,
    model: Box<dyn Model>,
    labels: Labels,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("model", &self.model)
            .field("labels", &self.labels.len())
            .finish()
    }
}

impl Pipeline {
    pub fn new(processor: Processor, model: Box<dyn Model>, labels: Labels) -> Self {
        Pipeline {
            processor,
            model,
            labels,
        }
    }

    /// Load `tokenizer.json`, `config.json` and `model.pt` from the model
    /// directory
    pub fn load(settings: &ModelSettings) -> anyhow::Result<Self> {
        let dir = &settings.dir;
        let device = settings.device.resolve();
        info!("loading model from {} on {:?}", dir.display(), device);

        let processor = Processor::from_file(&dir.join("tokenizer.json"), settings.max_text_len)?;
        let labels = Labels::from_config_file(&dir.join("config.json"))?;
        let model = TorchModel::load(&dir.join("model.pt"), device)
            .with_context(|| format!("failed to load model from {}", dir.display()))?;

        info!("model loaded with {} answer labels", labels.len());
        Ok(Pipeline::new(processor, Box::new(model), labels))
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Answer `question` about `image` with the single highest-scoring label
    pub fn answer(&self, question: &str, image: &RgbImage) -> Result<Answer> {
        let start = Instant::now();

        let encoding = self.processor.encode(question, image)?;
        let logits = self.model.logits(&encoding)?;
        let answer = Answer(self.best_label(&logits)?.to_owned());

        info!(
            question,
            answer = answer.as_str(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "answered question"
        );
        Ok(answer)
    }

    /// Map the argmax of the last dimension through the vocabulary
    fn best_label(&self, logits: &Tensor) -> Result<&str> {
        let size = logits.size();
        let width = size.last().copied().unwrap_or(0);
        if width != self.labels.len() as i64 {
            return Err(Error::Inference(format!(
                "model produced {width} scores for {} labels (shape {size:?})",
                self.labels.len()
            )));
        }

        let idx = logits.f_argmax(-1, false)?.f_view([-1])?.f_int64_value(&[0])?;
        debug!("argmax index {idx}");

        usize::try_from(idx)
            .ok()
            .and_then(|idx| self.labels.get(idx))
            .ok_or_else(|| Error::Inference(format!("label index {idx} is out of range")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test;
    use image::Rgb;
    use std::sync::Arc;

    #[derive(Debug)]
    struct WrongWidth;

    impl Model for WrongWidth {
        fn logits(&self, _: &Encoding) -> Result<Tensor> {
            Ok(Tensor::from_slice(&[1.0f32, 2.0]).view([1, 2]))
        }
    }

    #[derive(Debug)]
    struct Broken;

    impl Model for Broken {
        fn logits(&self, _: &Encoding) -> Result<Tensor> {
            Err(Error::Inference("out of memory".into()))
        }
    }

    #[test]
    fn answers_come_from_the_vocabulary() {
        let pipeline = test::pipeline();
        for (question, color) in [
            ("What are the colors of the cats?", [255, 255, 255]),
            ("how many cats are there?", [0, 0, 0]),
            ("", [10, 200, 30]),
            ("zebra unicorn", [128, 128, 128]),
        ] {
            let image = RgbImage::from_pixel(64, 64, Rgb(color));
            let answer = pipeline.answer(question, &image).unwrap();
            assert!(pipeline.labels().contains(answer.as_str()), "{answer}");
        }
    }

    #[test]
    fn picks_the_highest_score() {
        let pipeline = test::pipeline();
        let mut scores = [0.0f32; 12];
        scores[5] = 3.0;
        scores[9] = 2.5;
        let logits = Tensor::from_slice(&scores).view([1, 12]);
        assert_eq!(pipeline.best_label(&logits).unwrap(), test::LABELS[5]);
    }

    #[test]
    fn repeated_calls_agree() {
        let pipeline = test::pipeline();
        let image = test::decoded_png(100, 80, [30, 60, 90]);
        let first = pipeline.answer("what are the cats", &image).unwrap();
        for _ in 0..5 {
            assert_eq!(pipeline.answer("what are the cats", &image).unwrap(), first);
        }
    }

    #[test]
    fn concurrent_calls_get_their_own_answers() {
        let pipeline = Arc::new(test::pipeline());
        let inputs: Vec<(String, [u8; 3])> = vec![
            ("what".into(), [0, 0, 0]),
            ("what are the cats".into(), [255, 255, 255]),
            ("how many".into(), [120, 0, 0]),
            ("the colors of the cats ?".into(), [0, 0, 250]),
            ("".into(), [40, 40, 40]),
            ("are there cats".into(), [200, 200, 200]),
        ];

        let expected: Vec<Answer> = inputs
            .iter()
            .map(|(q, c)| {
                let image = RgbImage::from_pixel(48, 48, Rgb(*c));
                pipeline.answer(q, &image).unwrap()
            })
            .collect();

        let handles: Vec<_> = inputs
            .into_iter()
            .map(|(q, c)| {
                let pipeline = pipeline.clone();
                std::thread::spawn(move || {
                    let image = RgbImage::from_pixel(48, 48, Rgb(c));
                    pipeline.answer(&q, &image).unwrap()
                })
            })
            .collect();

        for (handle, expected) in handles.into_iter().zip(expected) {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    #[test]
    fn mismatched_head_fails_instead_of_guessing() {
        let pipeline = Pipeline::new(
            Processor::new(test::tokenizer(), 40),
            Box::new(WrongWidth),
            test::labels(),
        );
        let image = RgbImage::from_pixel(32, 32, Rgb([0, 0, 0]));
        let err = pipeline.answer("what", &image).unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    #[test]
    fn forward_failures_propagate() {
        let pipeline = Pipeline::new(
            Processor::new(test::tokenizer(), 40),
            Box::new(Broken),
            test::labels(),
        );
        let image = RgbImage::from_pixel(32, 32, Rgb([0, 0, 0]));
        let err = pipeline.answer("what", &image).unwrap_err();
        assert!(matches!(err, Error::Inference(msg) if msg == "out of memory"));
    }

    /// Needs an exported model: `VQA_MODEL_DIR=models/vilt-b32-finetuned-vqa`
    /// and the COCO image 000000039769.jpg in `VQA_TEST_IMAGE`.
    #[test]
    #[ignore]
    fn two_cats_regression() {
        let dir = std::env::var("VQA_MODEL_DIR").unwrap();
        let image = std::env::var("VQA_TEST_IMAGE").unwrap();
        let settings = ModelSettings {
            dir: dir.into(),
            ..ModelSettings::default()
        };
        let pipeline = Pipeline::load(&settings).unwrap();
        let bytes = std::fs::read(image).unwrap();
        let image = crate::decoder::decode_image(&bytes).unwrap();
        let answer = pipeline.answer("How many cats are there?", &image).unwrap();
        assert_eq!(answer.as_str(), "2");

        // Tabby cats: the answer names colors, e.g. "brown and white"
        let answer = pipeline
            .answer("What are the colors of the cats?", &image)
            .unwrap();
        let colors = [
            "black", "white", "brown", "gray", "grey", "orange", "tan", "beige", "tabby",
        ];
        assert!(
            answer.as_str().split(" and ").all(|part| colors.contains(&part)),
            "{answer}"
        );
        assert_eq!(
            pipeline
                .answer("What are the colors of the cats?", &image)
                .unwrap(),
            answer
        );
    }
}
