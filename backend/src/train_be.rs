use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use hyperion_clustering::{Ahc, Criterion, Linkage, Metric};
use hyperion_io::{ClassReaderOptions, Utt2Info, VectorClassReader, write_elbo_table};
use hyperion_pdfs::{AnyPlda, FitOptions, PldaFactory};
use hyperion_transforms::{LNorm, Lda, Transform, TransformList};
use nalgebra::DMatrix;
use tracing::info;

use crate::config::{AdaptWeights, TrainBeConfig};

/// ELBO traces and cluster labels produced by [`train_be`].
#[derive(Debug, Clone)]
pub struct TrainBeOutput {
    pub elbo: Vec<f64>,
    pub elbo_adapt1: Vec<f64>,
    pub elbo_adapt2: Option<Vec<f64>>,
    /// Cluster of every adaptation utterance, when AHC ran.
    pub adapt_labels: Option<Vec<usize>>,
}

fn lda_lnorm(lda: &Lda, lnorm: &LNorm) -> TransformList {
    TransformList::from_transforms(
        "transform_list",
        vec![Transform::Lda(lda.clone()), Transform::LNorm(lnorm.clone())],
    )
}

fn save_elbo(path: &Path, elbo: &[f64]) -> anyhow::Result<()> {
    write_elbo_table(path, elbo).with_context(|| format!("write {}", path.display()))
}

fn save_plda(path: &Path, plda: &AnyPlda) -> anyhow::Result<()> {
    plda.save(path).with_context(|| format!("save {}", path.display()))
}

fn average(original: &AnyPlda, adapted: &AnyPlda, w: AdaptWeights) -> anyhow::Result<AnyPlda> {
    original
        .weighted_avg_model(adapted, w.w_mu, w.w_b, w.w_w)
        .context("interpolate original and adapted plda")
}

/// Trains LDA, length normalization and PLDA on out-of-domain data, then
/// adapts them to the in-domain set:
///
/// 1. the length norm is recentred on the adaptation vectors with the
///    whitening kept fixed;
/// 2. a copy of the PLDA keeps training on the adaptation labels and the
///    original is interpolated towards it (`plda_adapt1`);
/// 3. optionally, the adaptation vectors are clustered with AHC on
///    `plda_adapt1` scores, `plda_adapt1` is refit on the cluster labels and
///    the original is interpolated towards the refit (`plda_adapt2`).
///
/// The adaptation weights apply to the original model, so weights of 1
/// keep it unchanged.
///
/// Everything is written under `cfg.output_path`.
pub fn train_be(cfg: &TrainBeConfig) -> anyhow::Result<TrainBeOutput> {
    let out = cfg.output_path.as_path();
    fs::create_dir_all(out).with_context(|| format!("create {}", out.display()))?;

    let train = VectorClassReader::new(&cfg.iv_file, &cfg.train_list, cfg.reader.clone())
        .read()
        .context("read training vectors")?;

    let t = Instant::now();
    let lda = Lda::fit(&train.x, &train.class_ids, Some(cfg.lda_dim), "lda").context("train lda")?;
    let x_lda = lda.predict(&train.x)?;
    info!(dim = lda.out_dim(), elapsed_s = t.elapsed().as_secs_f64(), "lda trained");

    let t = Instant::now();
    let mut lnorm = LNorm::new("lnorm");
    lnorm.fit(&x_lda).context("train lnorm")?;
    let x_ln = lnorm.predict(&x_lda)?;
    info!(elapsed_s = t.elapsed().as_secs_f64(), "lnorm trained");

    let t = Instant::now();
    let mut plda = PldaFactory::create(cfg.plda.plda_type, cfg.plda.y_dim, cfg.plda.z_dim, "plda");
    let elbo = plda
        .fit(&x_ln, &train.class_ids, &cfg.plda.fit_options())
        .context("train plda")?;
    info!(kind = %plda.plda_type(), elapsed_s = t.elapsed().as_secs_f64(), "plda trained");

    lda_lnorm(&lda, &lnorm)
        .save(out.join("lda_lnorm.json"))
        .context("save lda_lnorm")?;
    save_plda(&out.join("plda.json"), &plda)?;
    save_elbo(&out.join("elbo.csv"), &elbo)?;

    let adapt = VectorClassReader::new(&cfg.adapt_iv_file, &cfg.adapt_list, ClassReaderOptions::default())
        .read()
        .context("read adaptation vectors")?;
    let x_lda = lda.predict(&adapt.x)?;
    lnorm.set_updates(true, false);
    lnorm.fit(&x_lda).context("recentre lnorm")?;
    lda_lnorm(&lda, &lnorm)
        .save(out.join("lda_lnorm_adapt.json"))
        .context("save lda_lnorm_adapt")?;
    let x_ln = lnorm.predict(&x_lda)?;

    let adapt_opts = FitOptions::with_epochs(cfg.adapt_epochs);
    let mut adapted = plda.copy();
    let elbo_adapt1 = adapted
        .fit(&x_ln, &adapt.class_ids, &adapt_opts)
        .context("adapt plda")?;
    let plda_adapt1 = average(&plda, &adapted, cfg.adapt1)?;
    save_plda(&out.join("plda_adapt1.json"), &plda_adapt1)?;
    save_elbo(&out.join("elbo_adapt1.csv"), &elbo_adapt1)?;
    info!(utterances = adapt.keys.len(), "plda_adapt1 saved");

    if !cfg.do_ahc {
        return Ok(TrainBeOutput {
            elbo,
            elbo_adapt1,
            elbo_adapt2: None,
            adapt_labels: None,
        });
    }

    let labels = cluster(&plda_adapt1, &x_ln, cfg.num_spks)?;
    let mut refit = plda_adapt1.copy();
    let elbo_adapt2 = refit.fit(&x_ln, &labels, &adapt_opts).context("refit plda on clusters")?;
    let plda_adapt2 = average(&plda, &refit, cfg.adapt2)?;
    save_plda(&out.join("plda_adapt2.json"), &plda_adapt2)?;
    save_elbo(&out.join("elbo_adapt2.csv"), &elbo_adapt2)?;

    let spk2utt = Utt2Info::new(adapt.keys.clone(), labels.iter().map(|l| l.to_string()).collect())?;
    let scp = out.join("output_adapt_spk2utt.scp");
    spk2utt
        .save(&scp, " ")
        .with_context(|| format!("write {}", scp.display()))?;

    Ok(TrainBeOutput {
        elbo,
        elbo_adapt1,
        elbo_adapt2: Some(elbo_adapt2),
        adapt_labels: Some(labels),
    })
}

/// AHC on all-vs-all PLDA scores, cut to `num_spks` clusters.
fn cluster(plda: &AnyPlda, x: &DMatrix<f64>, num_spks: usize) -> anyhow::Result<Vec<usize>> {
    let t = Instant::now();
    let scores = plda.llr_1vs1(x, x).context("score adaptation vectors")?;
    let mut ahc = Ahc::new(Linkage::Average, Metric::Llr);
    ahc.fit(&scores)?;
    let labels = ahc
        .get_flat_clusters(Criterion::NumClusters(num_spks))
        .with_context(|| format!("cut dendrogram of {} utterances", x.nrows()))?;
    info!(clusters = num_spks, elapsed_s = t.elapsed().as_secs_f64(), "ahc done");
    Ok(labels)
}
