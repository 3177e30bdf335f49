//! Model catalog
//!
//! The set of selectable models is closed and mirrors the rembg catalog: the
//! identifiers below are part of the external interface and must stay verbatim.

use crate::error::{RemovalError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Base URL the rembg project publishes its ONNX model files under
pub const MODEL_RELEASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

/// A background removal model from the fixed catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "u2net")]
    U2Net,
    #[serde(rename = "u2netp")]
    U2NetP,
    #[serde(rename = "u2net_human_seg")]
    U2NetHumanSeg,
    #[serde(rename = "u2net_cloth_seg")]
    U2NetClothSeg,
    #[serde(rename = "silueta")]
    Silueta,
    #[serde(rename = "isnet-general-use")]
    IsNetGeneralUse,
    #[serde(rename = "isnet-anime")]
    IsNetAnime,
    #[serde(rename = "sam")]
    Sam,
    #[serde(rename = "birefnet-general")]
    BiRefNetGeneral,
    #[serde(rename = "birefnet-general-lite")]
    BiRefNetGeneralLite,
    #[serde(rename = "birefnet-dis")]
    BiRefNetDis,
    #[serde(rename = "birefnet-hrsod")]
    BiRefNetHrsod,
    #[serde(rename = "birefnet-cod")]
    BiRefNetCod,
    #[serde(rename = "birefnet-massive")]
    BiRefNetMassive,
}

/// Models sharing input size, normalization and output mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// U²-Net style saliency output, min-max normalized
    U2Net,
    /// Multi-class cloth parsing, background is class 0
    ClothSeg,
    /// `ISNet` dichotomous segmentation
    IsNet,
    /// `BiRefNet` logits, sigmoid applied
    BiRefNet,
    /// Prompted Segment Anything encoder/decoder pair
    Sam,
}

/// Preprocessing parameters for a model family
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Square model input size in pixels
    pub target_size: u32,
    /// Per-channel normalization mean (RGB)
    pub normalization_mean: [f32; 3],
    /// Per-channel normalization standard deviation (RGB)
    pub normalization_std: [f32; 3],
}

impl ModelKind {
    /// Every catalog entry, in display order
    pub const ALL: [ModelKind; 14] = [
        ModelKind::U2Net,
        ModelKind::U2NetP,
        ModelKind::U2NetHumanSeg,
        ModelKind::U2NetClothSeg,
        ModelKind::Silueta,
        ModelKind::IsNetGeneralUse,
        ModelKind::IsNetAnime,
        ModelKind::Sam,
        ModelKind::BiRefNetGeneral,
        ModelKind::BiRefNetGeneralLite,
        ModelKind::BiRefNetDis,
        ModelKind::BiRefNetHrsod,
        ModelKind::BiRefNetCod,
        ModelKind::BiRefNetMassive,
    ];

    /// Catalog identifier
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::U2Net => "u2net",
            Self::U2NetP => "u2netp",
            Self::U2NetHumanSeg => "u2net_human_seg",
            Self::U2NetClothSeg => "u2net_cloth_seg",
            Self::Silueta => "silueta",
            Self::IsNetGeneralUse => "isnet-general-use",
            Self::IsNetAnime => "isnet-anime",
            Self::Sam => "sam",
            Self::BiRefNetGeneral => "birefnet-general",
            Self::BiRefNetGeneralLite => "birefnet-general-lite",
            Self::BiRefNetDis => "birefnet-dis",
            Self::BiRefNetHrsod => "birefnet-hrsod",
            Self::BiRefNetCod => "birefnet-cod",
            Self::BiRefNetMassive => "birefnet-massive",
        }
    }

    /// Short human-readable description
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::U2Net => "General-purpose background removal.",
            Self::U2NetP => "Lightweight version of u2net for faster processing.",
            Self::U2NetHumanSeg => "Optimized for human segmentation.",
            Self::U2NetClothSeg => "Specialized for cloth segmentation.",
            Self::Silueta => "Advanced silhouette detection.",
            Self::IsNetGeneralUse => "General-purpose segmentation by ISNet.",
            Self::IsNetAnime => "Tailored for anime-style images.",
            Self::Sam => "Segment Anything Model for versatile segmentation tasks.",
            Self::BiRefNetGeneral => "BirefNet for general segmentation.",
            Self::BiRefNetGeneralLite => "Lightweight BirefNet for faster processing.",
            Self::BiRefNetDis => "BirefNet optimized for document images.",
            Self::BiRefNetHrsod => "High-resolution BirefNet for SOD tasks.",
            Self::BiRefNetCod => "BirefNet for contour detection.",
            Self::BiRefNetMassive => "Massive BirefNet for large-scale segmentation.",
        }
    }

    /// Name of the ONNX file published for this model
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::U2Net => "u2net.onnx",
            Self::U2NetP => "u2netp.onnx",
            Self::U2NetHumanSeg => "u2net_human_seg.onnx",
            Self::U2NetClothSeg => "u2net_cloth_seg.onnx",
            Self::Silueta => "silueta.onnx",
            Self::IsNetGeneralUse => "isnet-general-use.onnx",
            Self::IsNetAnime => "isnet-anime.onnx",
            Self::Sam => "vit_b-encoder-quant.onnx",
            Self::BiRefNetGeneral => "BiRefNet-general-epoch_244.onnx",
            Self::BiRefNetGeneralLite => "BiRefNet-general-bb_swin_v1_tiny-epoch_232.onnx",
            Self::BiRefNetDis => "BiRefNet-DIS-epoch_590.onnx",
            Self::BiRefNetHrsod => "BiRefNet-HRSOD_DHU-epoch_115.onnx",
            Self::BiRefNetCod => "BiRefNet-COD-epoch_125.onnx",
            Self::BiRefNetMassive => "BiRefNet-massive-TR_DIS5K_TR_TEs-epoch_420.onnx",
        }
    }

    /// Download URL of the ONNX file
    #[must_use]
    pub fn download_url(self) -> String {
        format!("{}/{}", MODEL_RELEASE_URL, self.file_name())
    }

    #[must_use]
    pub fn family(self) -> ModelFamily {
        match self {
            Self::U2Net | Self::U2NetP | Self::U2NetHumanSeg | Self::Silueta => ModelFamily::U2Net,
            Self::U2NetClothSeg => ModelFamily::ClothSeg,
            Self::IsNetGeneralUse | Self::IsNetAnime => ModelFamily::IsNet,
            Self::Sam => ModelFamily::Sam,
            Self::BiRefNetGeneral
            | Self::BiRefNetGeneralLite
            | Self::BiRefNetDis
            | Self::BiRefNetHrsod
            | Self::BiRefNetCod
            | Self::BiRefNetMassive => ModelFamily::BiRefNet,
        }
    }

    /// Preprocessing parameters, `None` for models that need prompts
    #[must_use]
    pub fn preprocessing(self) -> Option<PreprocessingConfig> {
        const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
        const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

        match self.family() {
            ModelFamily::U2Net => Some(PreprocessingConfig {
                target_size: 320,
                normalization_mean: IMAGENET_MEAN,
                normalization_std: IMAGENET_STD,
            }),
            ModelFamily::ClothSeg => Some(PreprocessingConfig {
                target_size: 768,
                normalization_mean: IMAGENET_MEAN,
                normalization_std: IMAGENET_STD,
            }),
            ModelFamily::IsNet => Some(PreprocessingConfig {
                target_size: 1024,
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
            }),
            ModelFamily::BiRefNet => Some(PreprocessingConfig {
                target_size: 1024,
                normalization_mean: IMAGENET_MEAN,
                normalization_std: IMAGENET_STD,
            }),
            ModelFamily::Sam => None,
        }
    }
}

impl Default for ModelKind {
    fn default() -> Self {
        Self::U2Net
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ModelKind {
    type Err = RemovalError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|model| model.id() == trimmed)
            .ok_or_else(|| {
                RemovalError::invalid_config(format!(
                    "Unknown model '{}'. Available models: {}",
                    trimmed,
                    Self::ALL
                        .iter()
                        .map(|m| m.id())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_ids_are_verbatim() {
        let ids: Vec<&str> = ModelKind::ALL.iter().map(|m| m.id()).collect();
        assert_eq!(
            ids,
            vec![
                "u2net",
                "u2netp",
                "u2net_human_seg",
                "u2net_cloth_seg",
                "silueta",
                "isnet-general-use",
                "isnet-anime",
                "sam",
                "birefnet-general",
                "birefnet-general-lite",
                "birefnet-dis",
                "birefnet-hrsod",
                "birefnet-cod",
                "birefnet-massive",
            ]
        );
    }

    #[test]
    fn test_parse_and_display() {
        for model in ModelKind::ALL {
            let parsed: ModelKind = model.id().parse().unwrap();
            assert_eq!(parsed, model);
            assert_eq!(model.to_string(), model.id());
            assert!(!model.description().is_empty());
        }

        assert_eq!(" u2netp ".parse::<ModelKind>().unwrap(), ModelKind::U2NetP);
    }

    #[test]
    fn test_unknown_model_lists_catalog() {
        let err = "u2net-xl".parse::<ModelKind>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("u2net-xl"));
        assert!(message.contains("birefnet-massive"));
    }

    #[test]
    fn test_serde_uses_catalog_ids() {
        let json = serde_json::to_string(&ModelKind::IsNetAnime).unwrap();
        assert_eq!(json, "\"isnet-anime\"");

        let model: ModelKind = serde_json::from_str("\"birefnet-cod\"").unwrap();
        assert_eq!(model, ModelKind::BiRefNetCod);
    }

    #[test]
    fn test_families_and_preprocessing() {
        assert_eq!(ModelKind::Silueta.family(), ModelFamily::U2Net);
        assert_eq!(ModelKind::U2NetClothSeg.family(), ModelFamily::ClothSeg);
        assert_eq!(ModelKind::BiRefNetHrsod.family(), ModelFamily::BiRefNet);

        assert_eq!(ModelKind::U2Net.preprocessing().unwrap().target_size, 320);
        assert_eq!(
            ModelKind::IsNetGeneralUse
                .preprocessing()
                .unwrap()
                .normalization_std,
            [1.0, 1.0, 1.0]
        );
        assert!(ModelKind::Sam.preprocessing().is_none());
    }

    #[test]
    fn test_download_url() {
        assert_eq!(
            ModelKind::U2Net.download_url(),
            "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2net.onnx"
        );
        assert!(ModelKind::BiRefNetGeneralLite
            .download_url()
            .ends_with("BiRefNet-general-bb_swin_v1_tiny-epoch_232.onnx"));
    }

    #[test]
    fn test_default_is_first_catalog_entry() {
        assert_eq!(ModelKind::default(), ModelKind::ALL[0]);
    }
}
