use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};
use rust_bert::{
    resources::{LocalResource, RemoteResource, ResourceProvider},
    RustBertError,
};
use rust_tokenizers::tokenizer::{BertTokenizer, Tokenizer, TruncationStrategy};
use std::{
    path::PathBuf,
    sync::mpsc,
    thread::{self, JoinHandle},
};
use tch::{CModule, Device, Kind, TchError, Tensor};
use tokio::{sync::oneshot, task};
use tracing::{debug, error, info};

use crate::{
    configuration::EmbeddingSettings,
    domain::{
        entities::post_point::Embeddings,
        services::helpers::{image_to_chw, l2_normalize},
    },
    ports::embeddings_service::{EmbeddingsService, EmbeddingsServiceError},
};

/// Text and image embeddings from a dual-tower CLIP model (by default `jina-clip-v1`).
///
/// Both towers are TorchScript exports projecting into the same 768 dimensional space,
/// so a text query can be compared with stored image embeddings.
///
/// The model runs on its own thread: inference is CPU/GPU heavy and must not block the async
/// runtime. Requests are queued on a bounded channel and answered one by one, which also
/// serializes every access to the model.
pub struct ClipEmbeddingsService {
    sender_to_runner: mpsc::SyncSender<RunnerMessage>,
    _thread_handle: JoinHandle<()>,
}

impl ClipEmbeddingsService {
    /// Spawns the runner thread and waits until the model is loaded.
    ///
    /// Blocks the calling thread while weights are downloaded and loaded: call it from
    /// `spawn_blocking` inside an async context.
    pub fn try_new(settings: &EmbeddingSettings) -> Result<Self, EmbeddingsServiceError> {
        let (sender, receiver) = mpsc::sync_channel(settings.channel_capacity);
        let (ready_sender, ready_receiver) = mpsc::channel();
        let runner_settings = settings.clone();

        let handle = thread::Builder::new()
            .name("clip-embeddings-runner".into())
            .spawn(move || Self::runner(runner_settings, receiver, ready_sender))
            .map_err(|e| EmbeddingsServiceError::ModelLoading(e.to_string()))?;

        ready_receiver
            .recv()
            .map_err(|_| EmbeddingsServiceError::RunnerUnavailable)??;

        Ok(Self {
            sender_to_runner: sender,
            _thread_handle: handle,
        })
    }

    /// The runner itself: loads the model once, then answers requests until every sender
    /// is dropped.
    ///
    /// A failing request is answered with an error and the runner keeps serving.
    #[tracing::instrument(name = "Embeddings runner", skip_all, fields(model = %settings.model_name))]
    fn runner(
        settings: EmbeddingSettings,
        receiver: mpsc::Receiver<RunnerMessage>,
        ready_sender: mpsc::Sender<Result<(), EmbeddingsServiceError>>,
    ) {
        let model = match ClipModel::load(&settings) {
            Ok(model) => model,
            Err(error) => {
                error!(?error, "Failed to load embeddings model");
                let _ = ready_sender.send(Err(error));
                return;
            }
        };
        info!(device = ?model.device, "Embeddings model loaded ✅");
        let _ = ready_sender.send(Ok(()));

        while let Ok((input, sender)) = receiver.recv() {
            let embeddings = match input {
                RunnerInput::Text(text) => model.encode_text(&text),
                RunnerInput::Image(image) => model.encode_image(&image),
            };

            if sender.send(embeddings).is_err() {
                debug!("Embeddings requester went away before the answer");
            }
        }

        info!("Embeddings runner stopped");
    }

    async fn request(&self, input: RunnerInput) -> Result<Embeddings, EmbeddingsServiceError> {
        let (sender, receiver) = oneshot::channel();

        // `send` blocks while the queue is full
        task::block_in_place(|| self.sender_to_runner.send((input, sender)))
            .map_err(|_| EmbeddingsServiceError::RunnerUnavailable)?;

        receiver
            .await
            .map_err(|_| EmbeddingsServiceError::RunnerUnavailable)?
    }
}

#[async_trait]
impl EmbeddingsService for ClipEmbeddingsService {
    #[tracing::instrument(name = "Encoding text", skip(self))]
    async fn encode_text(&self, text: &str) -> Result<Embeddings, EmbeddingsServiceError> {
        self.request(RunnerInput::Text(text.to_string())).await
    }

    #[tracing::instrument(
        name = "Encoding image",
        skip(self, image),
        fields(width = image.width(), height = image.height())
    )]
    async fn encode_image(
        &self,
        image: DynamicImage,
    ) -> Result<Embeddings, EmbeddingsServiceError> {
        self.request(RunnerInput::Image(image)).await
    }
}

enum RunnerInput {
    Text(String),
    Image(DynamicImage),
}

/// Message type for the internal channel: the input to encode and where to send the result
type RunnerMessage = (
    RunnerInput,
    oneshot::Sender<Result<Embeddings, EmbeddingsServiceError>>,
);

/// The loaded towers and tokenizer. Only ever lives on the runner thread.
struct ClipModel {
    text_module: CModule,
    vision_module: CModule,
    tokenizer: BertTokenizer,
    device: Device,
    dimension: usize,
    max_sequence_length: usize,
    image_size: u32,
    normalize_embeddings: bool,
}

impl ClipModel {
    fn load(settings: &EmbeddingSettings) -> Result<Self, EmbeddingsServiceError> {
        let cache_subdir = settings.model_name.replace('/', "-");
        let text_path = resolve_resource(&settings.text_model, &cache_subdir)?;
        let vision_path = resolve_resource(&settings.vision_model, &cache_subdir)?;
        let vocab_path = resolve_resource(&settings.vocab, &cache_subdir)?;

        let device = Device::cuda_if_available();
        let text_module = CModule::load_on_device(&text_path, device).map_err(loading_error)?;
        let vision_module =
            CModule::load_on_device(&vision_path, device).map_err(loading_error)?;
        // The text tower was trained on a lower-cased English WordPiece vocabulary
        let tokenizer = BertTokenizer::from_file(&vocab_path, true, true)
            .map_err(|e| EmbeddingsServiceError::ModelLoading(e.to_string()))?;

        Ok(Self {
            text_module,
            vision_module,
            tokenizer,
            device,
            dimension: settings.dimension,
            max_sequence_length: settings.max_sequence_length,
            image_size: settings.image_size,
            normalize_embeddings: settings.normalize_embeddings,
        })
    }

    fn encode_text(&self, text: &str) -> Result<Embeddings, EmbeddingsServiceError> {
        let tokenized = self.tokenizer.encode(
            text,
            None,
            self.max_sequence_length,
            &TruncationStrategy::LongestFirst,
            0,
        );

        let output = tch::no_grad(|| {
            let input_ids = Tensor::from_slice(tokenized.token_ids.as_slice())
                .unsqueeze(0)
                .to_device(self.device);
            let attention_mask = input_ids.ones_like();
            self.text_module.forward_ts(&[input_ids, attention_mask])
        })
        .map_err(encoding_error)?;

        self.to_embeddings(output)
    }

    fn encode_image(&self, image: &DynamicImage) -> Result<Embeddings, EmbeddingsServiceError> {
        let size = self.image_size as i64;
        let pixels = image_to_chw(image, self.image_size);

        let output = tch::no_grad(|| {
            let pixel_values = Tensor::from_slice(pixels.as_slice())
                .view([1, 3, size, size])
                .to_device(self.device);
            self.vision_module.forward_ts(&[pixel_values])
        })
        .map_err(encoding_error)?;

        self.to_embeddings(output)
    }

    /// Brings a `[1, dimension]` output back to the CPU as a checked vector
    fn to_embeddings(&self, output: Tensor) -> Result<Embeddings, EmbeddingsServiceError> {
        let output = output
            .to_kind(Kind::Float)
            .to_device(Device::Cpu)
            .flatten(0, -1);
        let mut embeddings = Vec::<f32>::try_from(&output).map_err(encoding_error)?;

        if embeddings.len() != self.dimension {
            return Err(EmbeddingsServiceError::UnexpectedDimension {
                expected: self.dimension,
                actual: embeddings.len(),
            });
        }
        if embeddings.iter().any(|value| !value.is_finite()) {
            return Err(EmbeddingsServiceError::Encoding(
                "embeddings contain non-finite values".into(),
            ));
        }
        if self.normalize_embeddings {
            l2_normalize(&mut embeddings);
        }

        Ok(embeddings)
    }
}

/// Remote resources are downloaded once into the `rust-bert` cache, local ones used in place
fn resolve_resource(
    location: &str,
    cache_subdir: &str,
) -> Result<PathBuf, EmbeddingsServiceError> {
    let path = if location.starts_with("http://") || location.starts_with("https://") {
        RemoteResource::new(location, cache_subdir).get_local_path()
    } else {
        LocalResource::from(PathBuf::from(location)).get_local_path()
    };

    path.map_err(|e: RustBertError| EmbeddingsServiceError::ModelLoading(e.to_string()))
}

fn loading_error(error: TchError) -> EmbeddingsServiceError {
    EmbeddingsServiceError::ModelLoading(error.to_string())
}

fn encoding_error(error: TchError) -> EmbeddingsServiceError {
    EmbeddingsServiceError::Encoding(error.to_string())
}
