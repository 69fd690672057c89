//! Shared fixtures for integration tests

#![allow(dead_code)]

use bgremove_lite::{InferenceBackend, InferenceEngine, MockBackend, ModelGeometry, PipelineOptions, RemovalPipeline};
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Pipeline over a mock backend; keep the returned file alive as the "model"
pub fn mock_pipeline(backend: MockBackend, width: u32, height: u32) -> (RemovalPipeline, NamedTempFile) {
    let model = NamedTempFile::new().unwrap();
    let engine = InferenceEngine::new(
        Box::new(backend) as Box<dyn InferenceBackend>,
        model.path(),
        ModelGeometry::new(width, height),
    );
    let options = PipelineOptions::for_engine(&engine);
    let pipeline = RemovalPipeline::new(Arc::new(engine), options).unwrap();
    (pipeline, model)
}

/// 2x2 image: white top row, black bottom row
pub fn two_by_two() -> RgbaImage {
    RgbaImage::from_fn(2, 2, |_, y| if y == 0 { WHITE } else { BLACK })
}

/// Left half red, right half blue
pub fn split_image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 255, 255])
        }
    })
}
