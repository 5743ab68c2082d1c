use futures::channel::oneshot;
use futures::executor::ThreadPool;
use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::assets::{AssetFetcher, AssetSource};
use crate::error::TextureFetchError;
use crate::gfx::resources::TextureImage;

/// Produces RGBA images without blocking the caller
pub trait ImageLoader {
    fn load(&self, source: &AssetSource) -> LocalBoxFuture<'static, Result<TextureImage, TextureFetchError>>;
}

/// Decodes any format the `image` crate was built with into RGBA8
pub fn decode_image(bytes: &[u8]) -> Result<TextureImage, TextureFetchError> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(TextureFetchError::EmptyImage);
    }
    Ok(TextureImage::new(rgba.width(), rgba.height(), rgba.into_raw()))
}

/// Fetches and decodes images on a worker pool
pub struct ThreadPoolImageLoader {
    pool: ThreadPool,
    fetcher: AssetFetcher,
}

impl ThreadPoolImageLoader {
    pub fn new(pool: ThreadPool, fetcher: AssetFetcher) -> Self {
        Self { pool, fetcher }
    }
}

impl ImageLoader for ThreadPoolImageLoader {
    fn load(&self, source: &AssetSource) -> LocalBoxFuture<'static, Result<TextureImage, TextureFetchError>> {
        let (tx, rx) = oneshot::channel();
        let fetcher = self.fetcher.clone();
        let source = source.clone();

        self.pool.spawn_ok(async move {
            let result = fetcher
                .read(&source)
                .map_err(TextureFetchError::from)
                .and_then(|bytes| decode_image(&bytes));
            let _ = tx.send(result);
        });

        async move { rx.await.unwrap_or(Err(TextureFetchError::Cancelled)) }.boxed_local()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::FetchError;

    /// Encodes a solid `width`x`height` PNG
    pub(crate) fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba(color));
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    /// Decodes in-memory sources synchronously; anything else fails to fetch
    pub(crate) struct InlineImageLoader;

    impl ImageLoader for InlineImageLoader {
        fn load(
            &self,
            source: &AssetSource,
        ) -> LocalBoxFuture<'static, Result<TextureImage, TextureFetchError>> {
            let result = match source {
                AssetSource::Bytes(bytes) => decode_image(bytes),
                _ => Err(TextureFetchError::Fetch(FetchError::Transport(
                    "offline".to_string(),
                ))),
            };
            futures::future::ready(result).boxed_local()
        }
    }

    #[test]
    fn test_decode_png_to_rgba() {
        let image = decode_image(&png(3, 2, [10, 20, 30, 255])).unwrap();
        assert_eq!((image.width, image.height), (3, 2));
        assert_eq!(&image.rgba[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(TextureFetchError::Decode(_))
        ));
    }
}
