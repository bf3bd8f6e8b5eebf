pub mod youtube;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audio::{error::PlaybackResult, track::ResolvedSource};

pub use youtube::YtDlpResolver;

/// Convierte locators (URLs o búsquedas de texto) en streams reproducibles.
#[async_trait]
pub trait AudioSourceResolver: Send + Sync + 'static {
    type Stream: Send + 'static;

    /// Resuelve un locator. El texto libre se trata como búsqueda y se usa
    /// el primer resultado.
    async fn resolve(&self, locator: &str) -> PlaybackResult<ResolvedSource<Self::Stream>>;

    /// Hasta `count` resultados de búsqueda para `seed`, sin resolver streams.
    async fn search(&self, seed: &str, count: usize) -> PlaybackResult<Vec<Candidate>>;
}

/// Un resultado de búsqueda.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Id estable para no elegir el mismo resultado dos veces seguidas.
    pub id: String,
    pub title: String,
    pub locator: String,
}
