//! End-to-end pipeline workflows against mock backends

mod common;

use bgremove_lite::{
    BgRemovalError, ImageIOService, InferenceBackend, InferenceEngine, MaskKind, MockBackend,
    ModelAssets, ModelGeometry, ModelOutput, PipelineOptions, RemovalPipeline, TRANSPARENT,
};
use common::{mock_pipeline, split_image, two_by_two, BLACK, WHITE};
use image::{Rgba, RgbaImage};
use ndarray::{ArrayD, IxDyn};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_top_row_foreground_end_to_end() {
    let (pipeline, _model) = mock_pipeline(MockBackend::with_values(vec![1.0, 1.0, 0.0, 0.0]), 2, 2);

    let output = pipeline.process_output(two_by_two()).await.unwrap();

    assert_eq!(output.image.dimensions(), (2, 2));
    assert_eq!(*output.image.get_pixel(0, 0), WHITE);
    assert_eq!(*output.image.get_pixel(1, 0), WHITE);
    assert_eq!(*output.image.get_pixel(0, 1), TRANSPARENT);
    assert_eq!(*output.image.get_pixel(1, 1), TRANSPARENT);
    assert_eq!(output.mask.kind, MaskKind::Binary);
    assert!(output.mask.is_two_level());
}

#[tokio::test]
async fn test_solid_color_round_trip_keeps_every_pixel() {
    let (pipeline, _model) = mock_pipeline(MockBackend::constant(0.9), 16, 16);
    let image = RgbaImage::from_pixel(37, 21, Rgba([12, 200, 64, 255]));

    let output = pipeline.process_output(image.clone()).await.unwrap();

    assert_eq!(output.image, image);
    assert!((output.mask.foreground_ratio() - 1.0).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_mask_follows_image_content_at_other_resolution() {
    // Red half is foreground; the mask is computed at 8x8 and scaled back up
    let (pipeline, _model) = mock_pipeline(MockBackend::red_channel(), 8, 8);
    let image = split_image(32, 16);

    let output = pipeline.process_output(image.clone()).await.unwrap();

    assert_eq!(output.image.dimensions(), (32, 16));
    assert_eq!(output.image.get_pixel(2, 8), image.get_pixel(2, 8));
    assert_eq!(*output.image.get_pixel(29, 8), TRANSPARENT);
}

#[tokio::test]
async fn test_tuple_output_uses_first_tensor_of_first_element() {
    let mask = ArrayD::from_shape_vec(IxDyn(&[1, 1, 2, 2]), vec![0.0, 1.0, 0.0, 1.0]).unwrap();
    let noise = ArrayD::from_elem(IxDyn(&[1, 1, 2, 2]), 1.0);
    let output = ModelOutput::Tuple(vec![
        ModelOutput::TensorList(vec![mask, noise.clone()]),
        ModelOutput::Tensor(noise),
    ]);
    let (pipeline, _model) = mock_pipeline(MockBackend::with_output(output), 2, 2);

    let result = pipeline.process_output(two_by_two()).await.unwrap();

    assert_eq!(result.mask.data, vec![0, 255, 0, 255]);
    assert_eq!(*result.image.get_pixel(0, 0), TRANSPARENT);
    assert_eq!(*result.image.get_pixel(1, 1), BLACK);
}

#[tokio::test]
async fn test_empty_tuple_is_inference_error() {
    let (pipeline, _model) = mock_pipeline(MockBackend::with_output(ModelOutput::Tuple(vec![])), 2, 2);
    let err = pipeline.process_output(two_by_two()).await.unwrap_err();
    assert!(matches!(err, BgRemovalError::Inference(_)));
}

#[tokio::test]
async fn test_concurrent_first_use_loads_once() {
    let backend = MockBackend::constant(1.0).with_load_delay(Duration::from_millis(50));
    let loads = backend.load_counter();
    let (pipeline, _model) = mock_pipeline(backend, 4, 4);

    let runs = (0..4).map(|i| {
        let pipeline = pipeline.clone();
        let image = RgbaImage::from_pixel(3 + i, 5, Rgba([9, 9, 9, 255]));
        async move { pipeline.process_output(image).await }
    });
    let results = futures::future::join_all(runs).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.engine().load_count(), 1);
}

#[tokio::test]
async fn test_forward_failure_surfaces_inference_error() {
    let (pipeline, _model) = mock_pipeline(MockBackend::failing_forward("boom"), 2, 2);
    let err = pipeline.process_output(two_by_two()).await.unwrap_err();
    assert!(matches!(err, BgRemovalError::Inference(ref msg) if msg.contains("boom")));
}

#[tokio::test]
async fn test_bundled_asset_copied_on_first_run() {
    let bundle = tempfile::tempdir().unwrap();
    let files = tempfile::tempdir().unwrap();
    std::fs::write(bundle.path().join("model.onnx"), b"weights").unwrap();

    let assets = Arc::new(ModelAssets::new(bundle.path(), files.path().join("models")));
    let engine = InferenceEngine::from_assets(
        Box::new(MockBackend::constant(1.0)) as Box<dyn InferenceBackend>,
        Arc::clone(&assets),
        "model.onnx",
        ModelGeometry::new(4, 4),
    );
    let options = PipelineOptions::for_engine(&engine);
    let pipeline = RemovalPipeline::new(Arc::new(engine), options).unwrap();

    let copied = files.path().join("models").join("model.onnx");
    assert!(!copied.exists());

    pipeline
        .process_output(RgbaImage::from_pixel(4, 4, WHITE))
        .await
        .unwrap();

    assert_eq!(std::fs::read(&copied).unwrap(), b"weights");
    assert!(!files.path().join("models").join("model.onnx.partial").exists());
}

#[tokio::test]
async fn test_missing_bundled_asset_is_model_load_and_retryable() {
    let bundle = tempfile::tempdir().unwrap();
    let files = tempfile::tempdir().unwrap();
    let engine = InferenceEngine::from_assets(
        Box::new(MockBackend::constant(1.0)) as Box<dyn InferenceBackend>,
        Arc::new(ModelAssets::new(bundle.path(), files.path())),
        "model.onnx",
        ModelGeometry::new(2, 2),
    );
    let options = PipelineOptions::for_engine(&engine);
    let pipeline = RemovalPipeline::new(Arc::new(engine), options).unwrap();

    let err = pipeline.process_output(two_by_two()).await.unwrap_err();
    assert!(matches!(err, BgRemovalError::ModelLoad(_)));
    assert!(!pipeline.engine().is_loaded());

    std::fs::write(bundle.path().join("model.onnx"), b"weights").unwrap();
    assert!(pipeline.process_output(two_by_two()).await.is_ok());
    assert!(pipeline.engine().is_loaded());
}

#[tokio::test]
async fn test_file_to_file_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("photo.png");
    split_image(10, 10).save(&input).unwrap();

    let (pipeline, _model) = mock_pipeline(MockBackend::red_channel(), 10, 10);
    let image = ImageIOService::load_image(&input).unwrap();
    let output = pipeline.process_output(image.to_rgba8()).await.unwrap();

    let output_path = ImageIOService::default_output_path(&input);
    ImageIOService::save_png(&output.image, &output_path).unwrap();

    let saved = image::open(&output_path).unwrap().to_rgba8();
    assert_eq!(saved, output.image);
    assert_eq!(saved.get_pixel(9, 0).0[3], 0);
    assert_eq!(saved.get_pixel(0, 0).0[3], 255);
}
