use crate::manifest::{FileEntry, ManifestNode};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors selecting a built-in catalog
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// No catalog with this id
    #[error("unknown catalog {0:?}")]
    UnknownCatalog(String),

    /// The catalog has no variant with this name
    #[error("catalog {catalog} has no variant {variant:?}")]
    UnknownVariant {
        /// Catalog id
        catalog: &'static str,
        /// Requested variant
        variant: String,
    },
}

/// Built-in catalogs of known model files, one per ML family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalog {
    /// Speech recognition checkpoints
    Whisper,
    /// Face embedding networks
    Facenet,
    /// Talking-head synthesis checkpoints and face restoration weights
    SadTalker,
    /// Expressive text-to-speech
    EmotiVoice,
    /// Portrait matting
    Modnet,
    /// Translation models
    HelsinkiNlp,
    /// Segmentation models
    Sam2,
}

impl Catalog {
    /// Every built-in catalog
    pub const ALL: [Self; 7] = [
        Self::Whisper,
        Self::Facenet,
        Self::SadTalker,
        Self::EmotiVoice,
        Self::Modnet,
        Self::HelsinkiNlp,
        Self::Sam2,
    ];

    /// Kebab-case id, also the catalog's subdirectory under the cache root
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Whisper => "whisper",
            Self::Facenet => "facenet",
            Self::SadTalker => "sadtalker",
            Self::EmotiVoice => "emotivoice",
            Self::Modnet => "modnet",
            Self::HelsinkiNlp => "helsinki-nlp",
            Self::Sam2 => "sam2",
        }
    }

    /// Full catalog as a namespace keyed by variant
    #[must_use]
    pub fn manifest(self) -> ManifestNode {
        match self {
            Self::Whisper => whisper(),
            Self::Facenet => facenet(),
            Self::SadTalker => sadtalker(),
            Self::EmotiVoice => emotivoice(),
            Self::Modnet => modnet(),
            Self::HelsinkiNlp => helsinki_nlp(),
            Self::Sam2 => sam2(),
        }
    }

    /// Manifest of a single variant
    ///
    /// # Errors
    /// Returns `UnknownVariant` if the catalog has no such variant
    pub fn variant(self, variant: &str) -> Result<ManifestNode, CatalogError> {
        self.manifest()
            .get(variant)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownVariant {
                catalog: self.name(),
                variant: variant.to_owned(),
            })
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Catalog {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|catalog| catalog.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CatalogError::UnknownCatalog(s.to_owned()))
    }
}

/// A resolved `family` or `family/variant` selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Catalog the selector names
    pub catalog: Catalog,
    /// Variant, if one was named
    pub variant: Option<String>,
    /// Manifest to resolve
    pub manifest: ManifestNode,
}

impl Selection {
    /// Parses a selector such as `sam2` or `whisper/tiny`
    ///
    /// # Errors
    /// Returns error if the catalog or variant is unknown
    pub fn parse(selector: &str) -> Result<Self, CatalogError> {
        let (family, variant) = match selector.split_once('/') {
            Some((family, variant)) => (family, Some(variant.trim())),
            None => (selector, None),
        };

        let catalog: Catalog = family.parse()?;
        let manifest = match variant {
            Some(variant) => catalog.variant(variant)?,
            None => catalog.manifest(),
        };

        Ok(Self {
            catalog,
            variant: variant.map(str::to_owned),
            manifest,
        })
    }

    /// Directory under `root` where this selection's files land
    #[must_use]
    pub fn directory(&self, root: &Path) -> PathBuf {
        let dir = root.join(self.catalog.name());
        match &self.variant {
            Some(variant) => dir.join(variant),
            None => dir,
        }
    }
}

fn whisper() -> ManifestNode {
    const BASE: &str = "https://openaipublic.azureedge.net/main/whisper/models";
    const LARGE_V2: &str = "81f7c96c852ee8fc832187b0132e569d6c3065a3252ed18e56effd0b6a73e524";
    // (variant, file, url digest, size); "large" is served from the large-v2 checkpoint
    const MODELS: [(&str, &str, &str, u64); 11] = [
        ("tiny.en", "tiny.en.pt", "d3dd57d32accea0b295c96e26691aa14d8822fac7d9d27d5dc00b4ca2826dd03", 75_571_315),
        ("tiny", "tiny.pt", "65147644a518d12f04e32d6f3b26facc3f8dd46e5390956a9424a650c0ce22b9", 75_572_083),
        ("base.en", "base.en.pt", "25a8566e1d0c1e2231d1c762132cd20e0f96a85d16145c3a00adf5d1ac670ead", 145_261_783),
        ("base", "base.pt", "ed3a0b6b1c0edf879ad9b11b1af5a0e6ab5db9205f891f668f8b0e6c6326e34e", 145_262_807),
        ("small.en", "small.en.pt", "f953ad0fd29cacd07d5a9eda5624af0f6bcf2258be67c92b79389873d91e0872", 483_615_683),
        ("small", "small.pt", "9ecf779972d90ba49c06d968637d720dd632c55bbf19d441fb42bf17a411e794", 483_617_219),
        ("medium.en", "medium.en.pt", "d7440d1dc186f76616474e0ff0b3b6b879abc9d1a4926b7adfa41db2d497ab4f", 1_528_006_491),
        ("medium", "medium.pt", "345ae4da62f9b3d59415adc60127b97c714f32e89e936602e85993674d08dcb1", 1_528_008_539),
        ("large-v1", "large-v1.pt", "e4b87e7e0bf463eb8e6956e646f1e277e901512310def2c24bf0e11bd3c28e9a", 3_086_999_982),
        ("large-v2", "large-v2.pt", LARGE_V2, 3_086_999_982),
        ("large", "large.pt", LARGE_V2, 3_086_999_982),
    ];

    ManifestNode::namespace(MODELS.iter().map(|&(variant, file, digest, size)| {
        let remote = if variant == "large" { "large-v2.pt" } else { file };
        (
            variant,
            ManifestNode::file(file, format!("{BASE}/{digest}/{remote}"), size),
        )
    }))
}

fn facenet() -> ManifestNode {
    const BASE: &str = "https://github.com/timesler/facenet-pytorch/releases/download/v2.2.9";
    let model = |file: &str, size| ManifestNode::file(file, format!("{BASE}/{file}"), size);

    ManifestNode::namespace([
        ("vggface2", model("20180402-114759-vggface2.pt", 111_898_327)),
        ("casia-webface", model("20180408-102900-casia-webface.pt", 115_887_415)),
    ])
}

fn sadtalker() -> ManifestNode {
    const REPO: &str = "https://modelscope.cn/api/v1/models/wwd123/sadtalker/repo?Revision=master&FilePath=";
    let checkpoint = |file: &str, size| {
        FileEntry::new(file, format!("{REPO}checkpoints%2F{file}"), size)
    };
    let gfpgan = |file: &str, size| {
        FileEntry::new(file, format!("{REPO}gfpgan%2Fweights%2F{file}"), size)
    };

    ManifestNode::namespace([(
        "sadtalker_v1",
        ManifestNode::namespace([
            (
                "sadtalker",
                ManifestNode::list([
                    checkpoint("mapping_00109-model.pth.tar", 155_779_231),
                    checkpoint("mapping_00229-model.pth.tar", 155_521_183),
                    checkpoint("SadTalker_V0.0.2_256.safetensors", 725_066_984),
                    checkpoint("SadTalker_V0.0.2_512.safetensors", 725_066_984),
                ]),
            ),
            (
                "gfpgan",
                ManifestNode::list([
                    gfpgan("alignment_WFLW_4HG.pth", 193_670_248),
                    gfpgan("detection_Resnet50_Final.pth", 109_497_761),
                    gfpgan("parsing_parsenet.pth", 85_331_193),
                    FileEntry::new(
                        "GFPGANv1.4.pth",
                        "https://github.com/TencentARC/GFPGAN/releases/download/v1.3.0/GFPGANv1.4.pth",
                        348_632_874,
                    ),
                ]),
            ),
        ]),
    )])
}

fn emotivoice() -> ManifestNode {
    const WEIGHTS: &str = "https://weights.replicate.delivery/default/EmotiVoice";
    const SIMBERT: &str = "https://www.modelscope.cn/api/v1/models/syq163/WangZeJun/repo?Revision=master&FilePath=simbert-base-chinese%2F";
    let simbert = |file: &str, size| FileEntry::new(file, format!("{SIMBERT}{file}"), size);

    ManifestNode::namespace([(
        "emotivoice_v1",
        ManifestNode::namespace([
            (
                "generator",
                ManifestNode::file("g_00140000", format!("{WEIGHTS}/g_00140000"), 213_240_309),
            ),
            (
                "simbert-base-chinese",
                ManifestNode::list([
                    simbert("pytorch_model.bin", 386_278_519),
                    simbert("config.json", 539),
                    simbert("vocab.txt", 78_632),
                ]),
            ),
            (
                "style_encoder",
                ManifestNode::file(
                    "checkpoint_163431",
                    format!("{WEIGHTS}/checkpoint_163431"),
                    1_159_371_361,
                ),
            ),
        ]),
    )])
}

fn modnet() -> ManifestNode {
    ManifestNode::namespace([(
        "webcam",
        ManifestNode::file(
            "modnet_webcam_portrait_matting.ckpt",
            "https://hf-mirror.com/XM5354/Modnet_models/resolve/main/modnet_webcam_portrait_matting.ckpt?download=true",
            26_255_603,
        ),
    )])
}

fn helsinki_nlp() -> ManifestNode {
    // (file, zh-en size, en-zh size)
    const FILES: [(&str, u64, u64); 7] = [
        ("config.json", 1_394, 1_403),
        ("generation_config.json", 293, 293),
        ("pytorch_model.bin", 312_087_009, 312_087_009),
        ("source.spm", 804_677, 806_435),
        ("target.spm", 806_530, 804_600),
        ("tokenizer_config.json", 44, 44),
        ("vocab.json", 1_617_902, 1_617_791),
    ];

    let model = |repo: &str, pick: fn(&(&str, u64, u64)) -> u64| {
        ManifestNode::list(FILES.iter().map(|file| {
            FileEntry::new(
                file.0,
                format!(
                    "https://hf-mirror.com/Helsinki-NLP/{repo}/resolve/main/{}?download=true",
                    file.0
                ),
                pick(file),
            )
        }))
    };

    ManifestNode::namespace([
        ("opus-mt-zh-en", model("opus-mt-zh-en", |file| file.1)),
        ("opus-mt-en-zh", model("opus-mt-en-zh", |file| file.2)),
    ])
}

fn sam2() -> ManifestNode {
    const BASE: &str = "https://dl.fbaipublicfiles.com/segment_anything_2/072824";
    let model = |file: &str, size| ManifestNode::file(file, format!("{BASE}/{file}"), size);

    ManifestNode::namespace([
        ("tiny", model("sam2_hiera_tiny.pt", 155_906_050)),
        ("base", model("sam2_hiera_base_plus.pt", 323_493_298)),
        ("small", model("sam2_hiera_small.pt", 184_309_650)),
        ("large", model("sam2_hiera_large.pt", 897_952_466)),
    ])
}
