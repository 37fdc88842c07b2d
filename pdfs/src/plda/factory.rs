use std::path::Path;

use hyperion_io::ModelStore;
use nalgebra::DMatrix;

use super::{FitOptions, FrPlda, Plda, PldaModel, PldaType, SPlda, load_config};
use crate::PdfError;
use crate::store::find_model;

/// A PLDA model of any variant.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyPlda {
    FrPlda(FrPlda),
    SPlda(SPlda),
    Plda(Plda),
}

macro_rules! dispatch {
    ($self:expr, $m:ident => $body:expr) => {
        match $self {
            AnyPlda::FrPlda($m) => $body,
            AnyPlda::SPlda($m) => $body,
            AnyPlda::Plda($m) => $body,
        }
    };
}

impl AnyPlda {
    pub fn plda_type(&self) -> PldaType {
        dispatch!(self, m => m.plda_type())
    }

    pub fn name(&self) -> &str {
        dispatch!(self, m => m.name())
    }

    pub fn x_dim(&self) -> usize {
        dispatch!(self, m => m.x_dim())
    }

    pub fn y_dim(&self) -> usize {
        dispatch!(self, m => m.y_dim())
    }

    pub fn z_dim(&self) -> usize {
        dispatch!(self, m => m.z_dim())
    }

    pub fn is_init(&self) -> bool {
        dispatch!(self, m => m.is_init())
    }

    pub fn fit(&mut self, x: &DMatrix<f64>, class_ids: &[usize], opts: &FitOptions) -> Result<Vec<f64>, PdfError> {
        dispatch!(self, m => m.fit(x, class_ids, opts))
    }

    pub fn llr_1vs1(&self, x1: &DMatrix<f64>, x2: &DMatrix<f64>) -> Result<DMatrix<f64>, PdfError> {
        dispatch!(self, m => m.llr_1vs1(x1, x2))
    }

    pub fn llr_nvs1(&self, x1: &DMatrix<f64>, class_ids1: &[usize], x2: &DMatrix<f64>) -> Result<DMatrix<f64>, PdfError> {
        dispatch!(self, m => m.llr_nvs1(x1, class_ids1, x2))
    }

    pub fn between_within(&self) -> Result<(DMatrix<f64>, DMatrix<f64>), PdfError> {
        dispatch!(self, m => m.between_within())
    }

    /// Both models must be the same variant.
    pub fn weighted_avg_model(&self, other: &Self, w_mu: f64, w_b: f64, w_w: f64) -> Result<Self, PdfError> {
        match (self, other) {
            (Self::FrPlda(a), Self::FrPlda(b)) => Ok(Self::FrPlda(a.weighted_avg_model(b, w_mu, w_b, w_w)?)),
            (Self::SPlda(a), Self::SPlda(b)) => Ok(Self::SPlda(a.weighted_avg_model(b, w_mu, w_b, w_w)?)),
            (Self::Plda(a), Self::Plda(b)) => Ok(Self::Plda(a.weighted_avg_model(b, w_mu, w_b, w_w)?)),
            _ => Err(PdfError::VariantMismatch {
                left: self.plda_type().to_string(),
                right: other.plda_type().to_string(),
            }),
        }
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PdfError> {
        dispatch!(self, m => m.save(path))
    }

    pub fn save_to(&self, store: &mut ModelStore) -> Result<(), PdfError> {
        dispatch!(self, m => m.save_to(store))
    }
}

impl From<FrPlda> for AnyPlda {
    fn from(m: FrPlda) -> Self {
        Self::FrPlda(m)
    }
}

impl From<SPlda> for AnyPlda {
    fn from(m: SPlda) -> Self {
        Self::SPlda(m)
    }
}

impl From<Plda> for AnyPlda {
    fn from(m: Plda) -> Self {
        Self::Plda(m)
    }
}

/// Builds untrained models by variant and loads trained ones of any variant.
pub struct PldaFactory;

impl PldaFactory {
    /// `y_dim` is ignored by the full-rank variant and `z_dim` by all but
    /// [`PldaType::Plda`].
    pub fn create(kind: PldaType, y_dim: usize, z_dim: usize, name: impl Into<String>) -> AnyPlda {
        match kind {
            PldaType::FrPlda => FrPlda::new(name).into(),
            PldaType::SPlda => SPlda::new(y_dim, name).into(),
            PldaType::Plda => Plda::new(y_dim, z_dim, name).into(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<AnyPlda, PdfError> {
        let store = ModelStore::open(path)?;
        let classes = PldaType::ALL.map(PldaType::class_name);
        let (name, _) = find_model(&store, &classes)?;
        Self::load_from(&store, &name)
    }

    pub fn load_from(store: &ModelStore, name: &str) -> Result<AnyPlda, PdfError> {
        let (kind, config) = load_config(store, name)?;
        Ok(match kind {
            PldaType::FrPlda => FrPlda::load_params(store, config)?.into(),
            PldaType::SPlda => SPlda::load_params(store, config)?.into(),
            PldaType::Plda => Plda::load_params(store, config)?.into(),
        })
    }
}
