//! File cache for the derived datasets.
//!
//! Each dataset lives at a fixed path. Under [`CachePolicy::Fingerprint`] a
//! sidecar `<file>.meta.json` records what the file was built from: the length
//! and modification time of every input file, a parameter string, and a
//! SHA-256 of the file itself. The cached file is reused only when all of those
//! still match; anything else (including a truncated or edited cache file)
//! triggers a rebuild. [`CachePolicy::Exists`] reuses any file that exists
//! and still parses.
//!
//! Files are written to a temporary file in the same directory and renamed into
//! place, so a crash never leaves a partial cache behind.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::geofile::{self, Record};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    #[default]
    Fingerprint,
    Exists,
}

pub struct Cache {
    policy: CachePolicy,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Meta {
    inputs: Vec<Stamp>,
    params: String,
    sha256: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Stamp {
    path: PathBuf,
    /// `None` if the input did not exist.
    len: Option<u64>,
    modified_ns: Option<u64>,
}

impl Stamp {
    fn of(path: &Path) -> Result<Self> {
        let (len, modified_ns) = match fs::metadata(path) {
            Ok(m) => {
                let modified = m.modified()?.duration_since(UNIX_EPOCH)?;
                (Some(m.len()), Some(modified.as_nanos() as u64))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (None, None),
            Err(e) => return Err(e).with_context(|| format!("Failed to stat {path:?}")),
        };
        Ok(Self {
            path: path.to_path_buf(),
            len,
            modified_ns,
        })
    }
}

impl Cache {
    pub fn new(policy: CachePolicy) -> Self {
        Self { policy }
    }

    /// Loads `target` if it is still valid for `inputs` and `params`, otherwise
    /// runs `build` and caches its result.
    pub fn get_or_build<R: Record>(
        &self,
        target: &Path,
        inputs: &[PathBuf],
        params: &str,
        build: impl FnOnce() -> Result<Vec<R>>,
    ) -> Result<Vec<R>> {
        match self.lookup(target, inputs, params)? {
            Ok(records) => {
                info!("Loading the cached version from {target:?}");
                return Ok(records);
            }
            Err(reason) => info!("Building {target:?} ({reason})"),
        }

        let records = build()?;
        let contents = geofile::to_string(&records)?;
        write_atomic(target, contents.as_bytes())?;

        if self.policy == CachePolicy::Fingerprint {
            let meta = Meta {
                inputs: inputs.iter().map(|x| Stamp::of(x)).collect::<Result<_>>()?,
                params: params.to_string(),
                sha256: digest(contents.as_bytes()),
            };
            let mut json = serde_json::to_string_pretty(&meta)?;
            json.push('\n');
            write_atomic(&meta_path(target), json.as_bytes())?;
        }

        info!("Wrote {} features to {target:?}", records.len());
        Ok(records)
    }

    /// `Ok(records)` on a hit, `Err(reason)` on a miss.
    fn lookup<R: Record>(
        &self,
        target: &Path,
        inputs: &[PathBuf],
        params: &str,
    ) -> Result<std::result::Result<Vec<R>, &'static str>> {
        if !target.is_file() {
            return Ok(Err("no cached file"));
        }
        let bytes = fs::read(target).with_context(|| format!("Failed to read {target:?}"))?;

        if self.policy == CachePolicy::Fingerprint {
            let meta_path = meta_path(target);
            if !meta_path.is_file() {
                return Ok(Err("no cache metadata"));
            }
            let meta: Meta = match serde_json::from_slice(&fs::read(&meta_path)?) {
                Ok(x) => x,
                Err(e) => {
                    warn!("Ignoring unreadable cache metadata {meta_path:?}: {e}");
                    return Ok(Err("unreadable cache metadata"));
                }
            };

            if meta.sha256 != digest(&bytes) {
                warn!("Cached file {target:?} does not match its checksum");
                return Ok(Err("checksum mismatch"));
            }
            if meta.params != params {
                return Ok(Err("parameters changed"));
            }
            let stamps: Vec<Stamp> = inputs.iter().map(|x| Stamp::of(x)).collect::<Result<_>>()?;
            if meta.inputs != stamps {
                return Ok(Err("inputs changed"));
            }
        }

        let Ok(contents) = String::from_utf8(bytes) else {
            warn!("Cached file {target:?} is not valid UTF-8");
            return Ok(Err("invalid UTF-8"));
        };
        match geofile::from_str(&contents) {
            Ok(records) => Ok(Ok(records)),
            Err(e) => {
                warn!("Cached file {target:?} could not be parsed: {e:#}");
                Ok(Err("unparseable cache file"))
            }
        }
    }
}

fn meta_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.file_name().unwrap_or_default());
    name.push(".meta.json");
    target.with_file_name(name)
}

fn digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Writes `contents` to `path` through a temporary file and a rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(x) if !x.as_os_str().is_empty() => x,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {dir:?}"))?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write {path:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use _model::TransitStop;
    use anyhow::bail;
    use geo::point;

    use super::*;
    use crate::shapes;

    fn stops() -> Vec<TransitStop> {
        vec![TransitStop {
            code: "52345".to_string(),
            id: "1".to_string(),
            name: "Côte-Vertu".to_string(),
            point: point!(x: 300_000.0, y: 5_040_000.0),
        }]
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        target: PathBuf,
        input: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("features/stops.geojson");
        let input = dir.path().join("stops.shp");
        fs::write(&input, "raw").unwrap();
        Fixture {
            target,
            input,
            _dir: dir,
        }
    }

    #[test]
    fn second_run_is_a_hit_and_leaves_files_untouched() {
        let f = fixture();
        let cache = Cache::new(CachePolicy::Fingerprint);
        let inputs = [f.input.clone()];

        let first = cache
            .get_or_build(&f.target, &inputs, "r=250", || Ok(stops()))
            .unwrap();
        let bytes = fs::read(&f.target).unwrap();
        let meta = fs::read(meta_path(&f.target)).unwrap();

        let second = cache
            .get_or_build::<TransitStop>(&f.target, &inputs, "r=250", || {
                bail!("should not rebuild")
            })
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read(&f.target).unwrap(), bytes);
        assert_eq!(fs::read(meta_path(&f.target)).unwrap(), meta);
    }

    #[test]
    fn corrupt_cache_is_rebuilt() {
        let f = fixture();
        let cache = Cache::new(CachePolicy::Fingerprint);
        let inputs = [f.input.clone()];
        cache
            .get_or_build(&f.target, &inputs, "", || Ok(stops()))
            .unwrap();

        let bytes = fs::read(&f.target).unwrap();
        fs::write(&f.target, &bytes[..bytes.len() / 2]).unwrap();

        let built = Cell::new(false);
        let output = cache
            .get_or_build(&f.target, &inputs, "", || {
                built.set(true);
                Ok(stops())
            })
            .unwrap();
        assert!(built.get());
        assert_eq!(output, stops());
        assert_eq!(fs::read(&f.target).unwrap(), bytes);
    }

    #[test]
    fn cache_cut_inside_a_character_is_rebuilt() {
        for policy in [CachePolicy::Fingerprint, CachePolicy::Exists] {
            let f = fixture();
            let cache = Cache::new(policy);
            let inputs = [f.input.clone()];
            cache
                .get_or_build(&f.target, &inputs, "", || Ok(stops()))
                .unwrap();

            // keep the first byte of the two-byte "ô"
            let bytes = fs::read(&f.target).unwrap();
            let cut = bytes.iter().position(|&x| x == 0xC3).unwrap() + 1;
            fs::write(&f.target, &bytes[..cut]).unwrap();

            let built = Cell::new(false);
            let output = cache
                .get_or_build(&f.target, &inputs, "", || {
                    built.set(true);
                    Ok(stops())
                })
                .unwrap();
            assert!(built.get(), "{policy:?}");
            assert_eq!(output, stops());
            assert_eq!(fs::read(&f.target).unwrap(), bytes);
        }
    }

    #[test]
    fn changed_inputs_or_params_invalidate() {
        let f = fixture();
        let cache = Cache::new(CachePolicy::Fingerprint);
        let inputs = [f.input.clone()];
        cache
            .get_or_build(&f.target, &inputs, "r=250", || Ok(stops()))
            .unwrap();

        let built = Cell::new(0);
        let build = || -> Result<Vec<TransitStop>> {
            built.set(built.get() + 1);
            Ok(stops())
        };
        cache
            .get_or_build(&f.target, &inputs, "r=500", build)
            .unwrap();
        assert_eq!(built.get(), 1);

        fs::write(&f.input, "raw data, now longer").unwrap();
        cache
            .get_or_build(&f.target, &inputs, "r=500", build)
            .unwrap();
        assert_eq!(built.get(), 2);
    }

    #[test]
    fn edited_shapefile_attributes_invalidate() {
        let f = fixture();
        let cache = Cache::new(CachePolicy::Fingerprint);
        let inputs = shapes::components(&f.input);
        for path in &inputs[1..4] {
            fs::write(path, "raw").unwrap();
        }
        cache
            .get_or_build(&f.target, &inputs, "", || Ok(stops()))
            .unwrap();

        // same geometry, renamed stop in the attribute table
        fs::write(f.input.with_extension("dbf"), "raw, renamed").unwrap();
        let built = Cell::new(false);
        cache
            .get_or_build(&f.target, &inputs, "", || {
                built.set(true);
                Ok(stops())
            })
            .unwrap();
        assert!(built.get());
    }

    #[test]
    fn exists_policy_trusts_any_file() {
        let f = fixture();
        let cache = Cache::new(CachePolicy::Exists);
        let inputs = [f.input.clone()];
        cache
            .get_or_build(&f.target, &inputs, "r=250", || Ok(stops()))
            .unwrap();
        assert!(!meta_path(&f.target).exists());

        fs::write(&f.input, "raw data, now longer").unwrap();
        let output = cache
            .get_or_build::<TransitStop>(&f.target, &inputs, "r=500", || {
                bail!("should not rebuild")
            })
            .unwrap();
        assert_eq!(output, stops());
    }

    #[test]
    fn failed_build_leaves_no_file() {
        let f = fixture();
        let cache = Cache::new(CachePolicy::Fingerprint);
        let result =
            cache.get_or_build::<TransitStop>(&f.target, &[], "", || bail!("network is down"));
        assert!(result.is_err());
        assert!(!f.target.exists());
        assert!(!meta_path(&f.target).exists());
    }

    #[test]
    fn meta_sits_next_to_target() {
        assert_eq!(
            meta_path(Path::new("data/grid.geojson")),
            PathBuf::from("data/grid.geojson.meta.json")
        );
    }
}
