//! One merge invocation, start to finish.
//!
//! The stages are: validate the request, load the sources, resolve
//! exposure times, optionally align, calibrate, merge, and encode the
//! outputs.  All of that runs as a job on a `JobQueue`, and only once the
//! job has handed back its fully encoded outputs is anything written.

use std::{
    path::PathBuf,
    sync::Mutex,
    time::Duration,
};

use log::info;
use serde::Serialize;

use job_queue::{lock, JobQueue, JobStatus};
use tone_map::Operator;

use crate::{
    align::{align_stack, Offset},
    exposure::{resolve_exposures, ExposureOverrides, ExposureSource},
    merge::{calibrate, merge_radiance, ExposureStack, LdrSample, Method},
    output::{encode_preview, encode_radiance, persist_all, EncodedFile, OutputFormat, PreviewFormat},
    source::{list_image_files, load_image},
    MergeConfig, MergeError,
};

#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    /// Files in the order given.
    Files(Vec<PathBuf>),
    /// Every image directly inside a directory, in file name order.
    Directory(PathBuf),
}

/// A tone-mapped LDR preview to write alongside the radiance map.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewRequest {
    pub operator: Operator,
    pub gamma: f32,
    pub path: PathBuf,
}

impl PreviewRequest {
    /// Looks up the operator by name.
    pub fn new(operator: &str, gamma: f32, path: PathBuf) -> Result<PreviewRequest, MergeError> {
        Ok(PreviewRequest {
            operator: operator.parse()?,
            gamma: gamma,
            path: path,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub input: InputSource,
    pub output: PathBuf,
    pub method: Method,
    /// Per-image exposure times in seconds, in input order.
    pub exposure_times: Option<Vec<f32>>,
    /// Per-image EVs, in input order.  Ignored if `exposure_times` is set.
    pub ev: Option<Vec<f32>>,
    pub align: bool,
    pub preview: Option<PreviewRequest>,
    pub normalize_exposure: bool,
    pub config: MergeConfig,
}

impl MergeRequest {
    pub fn new(input: InputSource, output: PathBuf) -> MergeRequest {
        MergeRequest {
            input: input,
            output: output,
            method: Method::default(),
            exposure_times: None,
            ev: None,
            align: false,
            preview: None,
            normalize_exposure: false,
            config: MergeConfig::default(),
        }
    }

    fn overrides(&self) -> ExposureOverrides {
        ExposureOverrides {
            times: self.exposure_times.clone(),
            evs: self.ev.clone(),
        }
    }
}

/// What a successful merge produced.  Per-image lists are in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeResult {
    pub output: PathBuf,
    pub preview: Option<PathBuf>,
    pub sources: Vec<PathBuf>,
    pub exposure_times: Vec<f32>,
    pub exposure_sources: Vec<ExposureSource>,
    pub offsets: Vec<Offset>,
    pub method: Method,
    pub width: usize,
    pub height: usize,
}

/// A finished merge that hasn't been written yet.
#[derive(Debug)]
pub struct MergeArtifacts {
    pub result: MergeResult,
    pub files: Vec<EncodedFile>,
}

/// Checks everything that can be checked without decoding an image, and
/// returns the list of source files.
pub fn validate(request: &MergeRequest) -> Result<Vec<PathBuf>, MergeError> {
    request.config.validate()?;
    OutputFormat::from_path(&request.output)?;
    if let Some(preview) = &request.preview {
        PreviewFormat::from_path(&preview.path)?;
        request
            .config
            .tonemap
            .params(preview.operator, preview.gamma)
            .validate()?;
    }

    let files = match &request.input {
        InputSource::Files(files) => files.clone(),
        InputSource::Directory(dir) => list_image_files(dir)?,
    };
    request.overrides().validate(files.len())?;
    if files.len() < 2 {
        return Err(MergeError::InsufficientData(format!(
            "merging needs at least 2 exposures, got {}",
            files.len()
        )));
    }

    Ok(files)
}

/// Marks the start of a stage, bailing out if the job was canceled.
fn stage(status: &Mutex<JobStatus>, text: String, ratio: f32) -> Result<(), MergeError> {
    let mut status = lock(status);
    if status.is_canceled() {
        return Err(MergeError::Canceled);
    }
    status.set_progress(text, ratio);
    Ok(())
}

/// Runs the merge entirely in memory.
pub fn build(
    request: &MergeRequest,
    files: &[PathBuf],
    status: &Mutex<JobStatus>,
) -> Result<MergeArtifacts, MergeError> {
    // Load images.
    let len = files.len() as f32;
    let mut images = Vec::with_capacity(files.len());
    for (img_i, path) in files.iter().enumerate() {
        stage(
            status,
            format!("Loading: {}", path.to_string_lossy()),
            img_i as f32 / len,
        )?;
        images.push(load_image(path)?);
    }

    let (width, height) = match images.first() {
        Some(first) => (first.info.width, first.info.height),
        None => return Err(MergeError::InsufficientData("no input images".into())),
    };
    for (i, img) in images.iter().enumerate() {
        if (img.info.width, img.info.height) != (width, height) {
            return Err(MergeError::DimensionMismatch {
                index: i,
                expected: (width, height),
                found: (img.info.width, img.info.height),
            });
        }
    }

    stage(status, "Resolving exposure times".into(), 0.0)?;
    let exposures = resolve_exposures(&images, &request.overrides(), request.normalize_exposure)?;
    let samples = images
        .into_iter()
        .zip(exposures.iter())
        .map(|(img, exposure)| LdrSample::new(img.info.filename, img.pixels, exposure.time))
        .collect();
    let mut stack = ExposureStack::new(width, height, samples)?;

    let mut offsets = vec![Offset::default(); stack.len()];
    if request.align {
        stage(status, "Aligning".into(), 0.0)?;
        let sorted_offsets = align_stack(&mut stack, &request.config.align);
        for (sample, offset) in stack.samples().iter().zip(sorted_offsets) {
            offsets[sample.input_index] = offset;
        }
    }

    stage(status, format!("Recovering response curve ({})", request.method), 0.0)?;
    let curve = calibrate(&stack, request.method, &request.config.calibration)?;

    stage(status, "Merging".into(), 0.0)?;
    let map = merge_radiance(&stack, &curve, request.method)?;

    stage(status, "Encoding".into(), 0.0)?;
    let mut encoded = vec![encode_radiance(&map, &request.output)?];
    if let Some(preview) = &request.preview {
        info!("Tone mapping preview ({})", preview.operator);
        let params = request.config.tonemap.params(preview.operator, preview.gamma);
        let ldr = tone_map::tonemap(&map.pixels, map.width, map.height, &params)?;
        encoded.push(encode_preview(&ldr, map.width, map.height, &preview.path)?);
    }

    Ok(MergeArtifacts {
        result: MergeResult {
            output: request.output.clone(),
            preview: request.preview.as_ref().map(|p| p.path.clone()),
            sources: files.to_vec(),
            exposure_times: exposures.iter().map(|e| e.time).collect(),
            exposure_sources: exposures.iter().map(|e| e.source).collect(),
            offsets: offsets,
            method: request.method,
            width: width,
            height: height,
        },
        files: encoded,
    })
}

/// Runs a merge and writes its outputs.
pub fn run(request: &MergeRequest) -> Result<MergeResult, MergeError> {
    run_with_budget(request, None)
}

/// Like `run()`, but gives up once `budget` has elapsed.  A merge that
/// runs over writes nothing.
pub fn run_with_budget(
    request: &MergeRequest,
    budget: Option<Duration>,
) -> Result<MergeResult, MergeError> {
    let files = validate(request)?;
    info!("Merging {} images into '{}'", files.len(), request.output.display());

    let queue = JobQueue::new();
    let job_request = request.clone();
    let job = queue
        .add_job("Merge HDRI", move |status| {
            build(&job_request, &files, status)
        })
        .ok_or(MergeError::Canceled)?;

    let artifacts = match budget {
        Some(budget) => job.wait_timeout(budget),
        None => job.wait(),
    }??;

    persist_all(&artifacts.files)?;
    Ok(artifacts.result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(files: usize) -> MergeRequest {
        let input = InputSource::Files((0..files).map(|i| PathBuf::from(format!("{}.png", i))).collect());
        MergeRequest::new(input, PathBuf::from("out.hdr"))
    }

    #[test]
    fn validate_checks_before_decoding() {
        // None of these files exist, so any decode attempt would fail
        // with a `Decode` error instead.
        let mut req = request(3);
        req.ev = Some(vec![0.0, 1.0]);
        assert!(matches!(validate(&req), Err(MergeError::MetadataMismatch(_))));

        let mut req = request(3);
        req.output = PathBuf::from("out.tiff");
        assert!(matches!(validate(&req), Err(MergeError::UnsupportedFormat(_))));

        let mut req = request(3);
        req.preview = Some(PreviewRequest::new("reinhard", 0.0, "p.png".into()).unwrap());
        assert!(matches!(validate(&req), Err(MergeError::InvalidParameter(_))));

        let mut req = request(3);
        req.preview = Some(PreviewRequest::new("drago", 2.2, "p.bmp".into()).unwrap());
        assert!(matches!(validate(&req), Err(MergeError::UnsupportedFormat(_))));

        assert!(matches!(
            validate(&request(1)),
            Err(MergeError::InsufficientData(_))
        ));
        assert_eq!(validate(&request(3)).unwrap().len(), 3);
    }

    #[test]
    fn unknown_operator() {
        assert!(matches!(
            PreviewRequest::new("filmic", 2.2, "p.png".into()),
            Err(MergeError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn build_reports_missing_sources() {
        let status = Mutex::new(JobStatus::default());
        let req = request(2);
        let files = validate(&req).unwrap();
        match build(&req, &files, &status) {
            Err(MergeError::Decode { path, .. }) => assert_eq!(path, PathBuf::from("0.png")),
            other => panic!("expected a decode error, got {:?}", other.map(|a| a.result)),
        }
    }
}
