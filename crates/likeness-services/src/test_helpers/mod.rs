//! In-memory stores and scripted clients for exercising the pipeline without Postgres,
//! object storage or network access.

mod clients;
mod stores;

pub use clients::{
    FakeBroker, FakeClassifier, GeneratorCall, ScriptedEnhancer, ScriptedGenerator, StaticReferences,
};
pub use stores::{InMemoryIdentityStore, InMemoryMediaStore, InMemoryStorage, RecordingUsageSink};

/// Encodes a blank PNG of the given size, for code that inspects image dimensions.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    image::RgbImage::new(width, height)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}
