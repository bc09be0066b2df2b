#![allow(dead_code)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, header};
use image::{ImageFormat, RgbImage};
use meshgen_gateway::server::{GatewayServer, GatewayServerConfig};
use meshgen_runtime::testing::{CountingAccelerator, PipelineStats, RecordingPipeline, StaticExporter};
use meshgen_runtime::{ComputeHandle, DeviceKind, GenerationParams, JobRunner};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const BOUNDARY: &str = "meshgen-test-boundary";

pub struct TestApp {
    pub app: Router,
    pub stats: Arc<PipelineStats>,
    pub reclaims: Arc<AtomicUsize>,
}

impl TestApp {
    pub fn reclaim_count(&self) -> usize {
        self.reclaims.load(Ordering::SeqCst)
    }
}

pub struct Setup {
    pub loaded: bool,
    pub pipeline_delay: Duration,
    pub pipeline_fails: bool,
    pub exporter: StaticExporter,
    pub device: DeviceKind,
    pub config: GatewayServerConfig,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            loaded: true,
            pipeline_delay: Duration::ZERO,
            pipeline_fails: false,
            exporter: StaticExporter::default(),
            device: DeviceKind::Cuda,
            config: GatewayServerConfig::default(),
        }
    }
}

pub fn build(setup: Setup) -> TestApp {
    let (accel, reclaims) = CountingAccelerator::new(setup.device.is_accelerator());
    let (mut pipeline, stats) = RecordingPipeline::new();
    pipeline = pipeline
        .with_delay(setup.pipeline_delay)
        .watching_reclaims(reclaims.clone());
    if setup.pipeline_fails {
        pipeline = pipeline.failing();
    }

    let handle = if setup.loaded {
        ComputeHandle::with_pipeline(Box::new(pipeline), setup.device, Arc::new(accel))
    } else {
        ComputeHandle::unavailable(setup.device, Arc::new(accel))
    };
    let runner = JobRunner::new(
        Arc::new(handle),
        Arc::new(setup.exporter),
        GenerationParams::default(),
    );

    TestApp {
        app: GatewayServer::new(setup.config, runner).build_app(),
        stats,
        reclaims,
    }
}

pub fn app() -> TestApp {
    build(Setup::default())
}

pub fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(w, h, |x, y| image::Rgb([(x * 40) as u8, (y * 40) as u8, 90]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).expect("encode png");
    buf.into_inner()
}

/// A `POST /convert` request carrying a single multipart part.
pub fn multipart_request(field: &str, file_name: Option<&str>, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    let disposition = match file_name {
        Some(name) => format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\n"),
        None => format!("Content-Disposition: form-data; name=\"{field}\"\r\n"),
    };
    body.extend_from_slice(disposition.as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/convert")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn upload(file_name: &str, content: &[u8]) -> Request<Body> {
    multipart_request("file", Some(file_name), content)
}

pub async fn body_bytes(resp: Response<Body>) -> Vec<u8> {
    to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec()
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(resp).await).expect("json body")
}

pub fn header_str<'a>(resp: &'a Response<Body>, name: header::HeaderName) -> &'a str {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}
