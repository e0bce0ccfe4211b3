//! The correction stage registry: a fixed catalogue of stage kinds, each at a
//! canonical slot, composed into the Correction Pipeline in slot order.

use super::stages::background::BackgroundParams;
use super::stages::banding::BandingParams;
use super::stages::crop::CropParams;
use super::stages::dead_line::DeadLineParams;
use super::stages::enhance::EnhanceParams;
use super::stages::mustache::MustacheParams;
use super::stages::pincushion::PincushionParams;
use super::stages::{background, bad_pixel, banding, crop, dark, dead_line, enhance, flat, mustache, pincushion};
use crate::calibration::BadPixelMask;
use crate::frame::Frame;

pub const SLOT_DARK: i32 = 100;
pub const SLOT_FLAT: i32 = 200;
pub const SLOT_BAD_PIXEL: i32 = 250;
pub const SLOT_BANDING: i32 = 300;
pub const SLOT_DEAD_LINE: i32 = 400;
pub const SLOT_PINCUSHION: i32 = 450;
pub const SLOT_MUSTACHE: i32 = 455;
pub const SLOT_ENHANCE: i32 = 480;
pub const SLOT_CROP: i32 = 500;
pub const SLOT_BACKGROUND: i32 = 600;

/// The slot at which the pre-distortion preview snapshot is captured: the
/// live feed shows the frame as it stood right before the first remap stage.
pub const DISTORTION_PREVIEW_SLOT: i32 = SLOT_PINCUSHION;

/// One variant per correction stage, each carrying its own parameters (or
/// none, for stages that pull their input purely from the pipeline context).
#[derive(Clone, Debug)]
pub enum StageKind {
    DarkSubtract,
    FlatCorrect,
    BadPixelReplace,
    BandingCorrect(BandingParams),
    DeadLineFill(DeadLineParams),
    PincushionRemap(PincushionParams),
    MustacheRemap(MustacheParams),
    Enhance(EnhanceParams),
    Crop(CropParams),
    BackgroundSeparate(BackgroundParams),
}

impl StageKind {
    pub fn canonical_slot(&self) -> i32 {
        match self {
            StageKind::DarkSubtract => SLOT_DARK,
            StageKind::FlatCorrect => SLOT_FLAT,
            StageKind::BadPixelReplace => SLOT_BAD_PIXEL,
            StageKind::BandingCorrect(_) => SLOT_BANDING,
            StageKind::DeadLineFill(_) => SLOT_DEAD_LINE,
            StageKind::PincushionRemap(_) => SLOT_PINCUSHION,
            StageKind::MustacheRemap(_) => SLOT_MUSTACHE,
            StageKind::Enhance(_) => SLOT_ENHANCE,
            StageKind::Crop(_) => SLOT_CROP,
            StageKind::BackgroundSeparate(_) => SLOT_BACKGROUND,
        }
    }
}

/// Context a stage may pull references from; only dark/flat/bad-pixel stages
/// consult it, the rest carry everything they need in their own params.
#[derive(Clone, Copy, Default)]
pub struct PipelineContext<'a> {
    pub dark: Option<&'a Frame>,
    pub flat: Option<&'a Frame>,
    pub bad_pixel_mask: Option<&'a BadPixelMask>,
}

/// A stage slotted into the pipeline, with its display name and the
/// auto-apply gate (disabled stages still cache their input, but pass it
/// through unmodified).
#[derive(Clone, Debug)]
pub struct StageEntry {
    pub slot: i32,
    pub name: String,
    pub auto_enabled: bool,
    pub kind: StageKind,
}

impl StageEntry {
    pub fn new(name: impl Into<String>, auto_enabled: bool, kind: StageKind) -> Self {
        Self {
            slot: kind.canonical_slot(),
            name: name.into(),
            auto_enabled,
            kind,
        }
    }
}

pub fn apply_stage(kind: &StageKind, frame: &Frame, ctx: &PipelineContext<'_>) -> Frame {
    match kind {
        StageKind::DarkSubtract => dark::apply(frame, ctx.dark),
        StageKind::FlatCorrect => flat::apply(frame, ctx.flat),
        StageKind::BadPixelReplace => bad_pixel::apply(frame, ctx.bad_pixel_mask),
        StageKind::BandingCorrect(p) => banding::apply(frame, p),
        StageKind::DeadLineFill(p) => dead_line::apply(frame, p),
        StageKind::PincushionRemap(p) => pincushion::apply(frame, p),
        StageKind::MustacheRemap(p) => mustache::apply(frame, p),
        StageKind::Enhance(p) => enhance::apply(frame, p),
        StageKind::Crop(p) => crop::apply(frame, p),
        StageKind::BackgroundSeparate(p) => background::apply(frame, p),
    }
}

/// A reasonable out-of-the-box stage list: every stage present, at its
/// canonical slot, with distortion/enhance/crop/background disabled until a
/// profile enables them.
pub fn default_stages() -> Vec<StageEntry> {
    vec![
        StageEntry::new("dark_subtract", true, StageKind::DarkSubtract),
        StageEntry::new("flat_correct", true, StageKind::FlatCorrect),
        StageEntry::new("bad_pixel_replace", true, StageKind::BadPixelReplace),
        StageEntry::new("banding_correct", false, StageKind::BandingCorrect(BandingParams::default())),
        StageEntry::new("dead_line_fill", false, StageKind::DeadLineFill(DeadLineParams::default())),
        StageEntry::new("pincushion_remap", false, StageKind::PincushionRemap(PincushionParams::default())),
        StageEntry::new("mustache_remap", false, StageKind::MustacheRemap(MustacheParams::default())),
        StageEntry::new("enhance", false, StageKind::Enhance(EnhanceParams::default())),
        StageEntry::new("crop", false, StageKind::Crop(CropParams::default())),
        StageEntry::new("background_separate", false, StageKind::BackgroundSeparate(BackgroundParams::default())),
    ]
}
