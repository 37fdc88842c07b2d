use std::time::Instant;

use anyhow::Context;
use hyperion_io::{ModelStore, VectorClassReader};
use hyperion_transforms::{NSbSw, Nda, SbSw, TransformList};
use tracing::{debug, info};

use crate::config::TrainNdaConfig;

/// Trains an NDA projection, optionally on top of a preprocessing transform
/// list, and saves it to `cfg.output_path`.
///
/// With `save_tlist` the output is a transform list: the preprocessing list
/// with the NDA appended when `append_tlist` is set, otherwise a new list
/// holding only the NDA.
pub fn train_nda(cfg: &TrainNdaConfig) -> anyhow::Result<()> {
    let preproc = cfg
        .preproc_file
        .as_ref()
        .map(|path| TransformList::load(path).with_context(|| format!("load preproc {}", path.display())))
        .transpose()?;

    let data = VectorClassReader::new(&cfg.iv_file, &cfg.train_list, cfg.reader.clone())
        .read()
        .context("read training vectors")?;
    let x = match &preproc {
        Some(list) => list.predict(&data.x).context("apply preproc")?,
        None => data.x,
    };

    let t = Instant::now();
    let scatter = NSbSw::new(cfg.k, cfg.alpha)
        .fit(&x, &data.class_ids)
        .context("nearest-neighbour scatter")?;
    let nda = Nda::from_scatter(&scatter, cfg.nda_dim, cfg.name.clone()).context("train nda")?;
    info!(
        in_dim = nda.in_dim(),
        out_dim = nda.out_dim(),
        k = cfg.k,
        alpha = cfg.alpha,
        elapsed_s = t.elapsed().as_secs_f64(),
        "nda trained"
    );

    let projected = SbSw::fit(&nda.predict(&x)?, &data.class_ids)?;
    let head = projected.sb.nrows().min(4);
    debug!(
        sb = ?projected.sb.view((0, 0), (head, head)),
        sw = ?projected.sw.view((0, 0), (head, head)),
        "projected scatter"
    );

    let out = &cfg.output_path;
    if cfg.save_tlist {
        let list = match preproc {
            Some(mut list) if cfg.append_tlist => {
                list.append(nda);
                list
            }
            _ => TransformList::from_transforms("transform_list", vec![nda.into()]),
        };
        list.save(out).with_context(|| format!("save {}", out.display()))?;
    } else {
        let mut store = ModelStore::new();
        nda.save_to(&mut store)?;
        store.save(out).with_context(|| format!("save {}", out.display()))?;
    }
    info!(path = %out.display(), "nda saved");
    Ok(())
}
