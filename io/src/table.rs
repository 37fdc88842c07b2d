use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::IoError;

/// `%.18e` the way C printf writes it: signed exponent, at least two digits.
fn sci18(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let s = format!("{v:.18e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => s,
    }
}

/// Writes a training trace as `epoch,value` rows in `%.18e` formatting,
/// one row per epoch starting at 0.
pub fn write_elbo_table(path: impl AsRef<Path>, values: &[f64]) -> Result<(), IoError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| IoError::file(path, e))?;
    let mut w = BufWriter::new(file);
    for (epoch, value) in values.iter().enumerate() {
        writeln!(w, "{},{}", sci18(epoch as f64), sci18(*value)).map_err(|e| IoError::file(path, e))?;
    }
    w.flush().map_err(|e| IoError::file(path, e))?;
    Ok(())
}
