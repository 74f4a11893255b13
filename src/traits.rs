use crate::errors::Result;
use crate::model::ModelName;

/// Bytes-in, bytes-out background removal.
///
/// The processors only depend on this trait, so inference can be swapped for a
/// mock in tests.
pub trait BackgroundRemover {
    /// Remove the background from an encoded image and return an encoded PNG
    /// with transparency.
    fn remove(&self, image: &[u8], model: ModelName) -> Result<Vec<u8>>;
}

impl<R: BackgroundRemover + ?Sized> BackgroundRemover for &R {
    fn remove(&self, image: &[u8], model: ModelName) -> Result<Vec<u8>> {
        (**self).remove(image, model)
    }
}
