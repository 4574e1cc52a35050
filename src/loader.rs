//! Input file → shapes, with an ordered fallback chain.
//!
//! The standard chain tries a strict direct read first and a tolerant
//! document import second. The first strategy that yields at least one shape
//! wins; partial results are never returned.

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::kernel::{CadKernel, KernelResult};

pub type LoadResult<T> = Result<T, LoadError>;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: no geometry found", path.display())]
    EmptyGeometry { path: PathBuf },

    #[error("{}: could not parse file ({})", path.display(), reasons.join("; "))]
    UnparsableFile { path: PathBuf, reasons: Vec<String> },
}

/// One way of turning a file into shapes.
pub trait LoadStrategy<S> {
    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns the kernel or I/O error that stopped this strategy.
    fn load(&self, path: &Path) -> KernelResult<Vec<S>>;
}

/// Strict UTF-8 read, first data section, every shell must convert.
pub struct DirectRead<'k, K> {
    kernel: &'k K,
}

impl<'k, K> DirectRead<'k, K> {
    #[must_use]
    pub fn new(kernel: &'k K) -> Self {
        Self { kernel }
    }
}

impl<K: CadKernel> LoadStrategy<K::Shape> for DirectRead<'_, K> {
    fn name(&self) -> &'static str {
        "direct-read"
    }

    fn load(&self, path: &Path) -> KernelResult<Vec<K::Shape>> {
        let text = fs::read_to_string(path)?;
        self.kernel.read_shapes(&text)
    }
}

/// Tolerant read (lossy UTF-8, no BOM, no comments), every data section.
pub struct DocumentImport<'k, K> {
    kernel: &'k K,
}

impl<'k, K> DocumentImport<'k, K> {
    #[must_use]
    pub fn new(kernel: &'k K) -> Self {
        Self { kernel }
    }
}

impl<K: CadKernel> LoadStrategy<K::Shape> for DocumentImport<'_, K> {
    fn name(&self) -> &'static str {
        "document-import"
    }

    fn load(&self, path: &Path) -> KernelResult<Vec<K::Shape>> {
        let bytes = fs::read(path)?;
        self.kernel.import_document(&tolerant_step_text(&bytes))
    }
}

/// Shapes read from one file, tagged with the strategy that produced them.
#[derive(Debug)]
pub struct LoadedGeometry<S> {
    shapes: Vec<S>,
    strategy: &'static str,
}

impl<S> LoadedGeometry<S> {
    #[must_use]
    pub fn shapes(&self) -> &[S] {
        &self.shapes
    }

    #[must_use]
    pub fn strategy(&self) -> &'static str {
        self.strategy
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

pub struct GeometryLoader<'k, S> {
    strategies: Vec<Box<dyn LoadStrategy<S> + 'k>>,
}

impl<'k, S> GeometryLoader<'k, S> {
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn LoadStrategy<S> + 'k>>) -> Self {
        Self { strategies }
    }

    /// Direct read, then document import.
    #[must_use]
    pub fn for_kernel<K>(kernel: &'k K) -> Self
    where
        K: CadKernel<Shape = S>,
    {
        Self::new(vec![
            Box::new(DirectRead::new(kernel)),
            Box::new(DocumentImport::new(kernel)),
        ])
    }

    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Runs the strategies in order.
    ///
    /// # Errors
    ///
    /// - [`LoadError::Unreadable`] when `path` is not a readable regular file.
    /// - [`LoadError::EmptyGeometry`] when a strategy parsed the file but no
    ///   strategy found a shape.
    /// - [`LoadError::UnparsableFile`] when every strategy failed.
    pub fn load(&self, path: &Path) -> LoadResult<LoadedGeometry<S>> {
        let unreadable = |source| LoadError::Unreadable {
            path: path.to_path_buf(),
            source,
        };
        let meta = fs::metadata(path).map_err(unreadable)?;
        if !meta.is_file() {
            return Err(unreadable(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        let mut reasons = Vec::new();
        let mut parsed_empty = false;
        for strategy in &self.strategies {
            match strategy.load(path) {
                Ok(shapes) if !shapes.is_empty() => {
                    log::debug!(
                        "{}: {} produced {} shape(s)",
                        path.display(),
                        strategy.name(),
                        shapes.len()
                    );
                    return Ok(LoadedGeometry {
                        shapes,
                        strategy: strategy.name(),
                    });
                }
                Ok(_) => {
                    log::debug!("{}: {} found no shapes", path.display(), strategy.name());
                    parsed_empty = true;
                }
                Err(err) => {
                    log::debug!("{}: {} failed: {err}", path.display(), strategy.name());
                    reasons.push(format!("{}: {err}", strategy.name()));
                }
            }
        }

        if parsed_empty {
            Err(LoadError::EmptyGeometry {
                path: path.to_path_buf(),
            })
        } else {
            Err(LoadError::UnparsableFile {
                path: path.to_path_buf(),
                reasons,
            })
        }
    }
}

/// Decodes STEP bytes leniently: invalid UTF-8 is replaced, a leading byte
/// order mark is dropped, and `/* ... */` comments outside string literals are
/// blanked out.
#[must_use]
pub fn tolerant_step_text(bytes: &[u8]) -> String {
    let decoded: Cow<'_, str> = String::from_utf8_lossy(bytes);
    let text: &str = &decoded;
    strip_comments(text.strip_prefix('\u{feff}').unwrap_or(text))
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            // A doubled quote closes and immediately reopens, which is the
            // STEP escape for a literal quote.
            in_string = c != '\'';
            out.push(c);
            continue;
        }
        match c {
            '\'' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelError;

    struct Scripted {
        name: &'static str,
        result: fn() -> KernelResult<Vec<u32>>,
    }

    impl LoadStrategy<u32> for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn load(&self, _path: &Path) -> KernelResult<Vec<u32>> {
            (self.result)()
        }
    }

    fn loader(results: &[(&'static str, fn() -> KernelResult<Vec<u32>>)]) -> GeometryLoader<'static, u32> {
        GeometryLoader::new(
            results
                .iter()
                .map(|&(name, result)| Box::new(Scripted { name, result }) as Box<dyn LoadStrategy<u32>>)
                .collect(),
        )
    }

    fn fails() -> KernelResult<Vec<u32>> {
        Err(KernelError::Parse("bad header".to_string()))
    }

    fn empty() -> KernelResult<Vec<u32>> {
        Ok(Vec::new())
    }

    fn two() -> KernelResult<Vec<u32>> {
        Ok(vec![1, 2])
    }

    fn scratch_file() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    #[test]
    fn first_successful_strategy_wins() {
        let file = scratch_file();
        let loaded = loader(&[("a", two), ("b", fails)]).load(file.path()).unwrap();
        assert_eq!(loaded.strategy(), "a");
        assert_eq!(loaded.shapes(), &[1, 2]);
    }

    #[test]
    fn falls_back_when_first_fails_or_is_empty() {
        let file = scratch_file();
        let loaded = loader(&[("a", fails), ("b", two)]).load(file.path()).unwrap();
        assert_eq!(loaded.strategy(), "b");

        let loaded = loader(&[("a", empty), ("b", two)]).load(file.path()).unwrap();
        assert_eq!(loaded.strategy(), "b");
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn all_empty_is_empty_geometry() {
        let file = scratch_file();
        let err = loader(&[("a", empty), ("b", empty)]).load(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::EmptyGeometry { .. }));
    }

    #[test]
    fn all_failing_is_unparsable_with_reasons() {
        let file = scratch_file();
        let err = loader(&[("a", fails), ("b", fails)]).load(file.path()).unwrap_err();
        match err {
            LoadError::UnparsableFile { reasons, .. } => {
                assert_eq!(reasons.len(), 2);
                assert!(reasons[0].starts_with("a: "));
                assert!(reasons[1].contains("bad header"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_path_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = loader(&[("a", two)]).load(&dir.path().join("nope.step")).unwrap_err();
        assert!(matches!(err, LoadError::Unreadable { .. }));

        let err = loader(&[("a", two)]).load(dir.path()).unwrap_err();
        assert!(matches!(err, LoadError::Unreadable { .. }));
    }

    #[test]
    fn tolerant_text_strips_bom_and_comments() {
        let raw = "\u{feff}ISO-10303-21; /* header\n comment */ DATA;".as_bytes();
        assert_eq!(tolerant_step_text(raw), "ISO-10303-21;   DATA;");
    }

    #[test]
    fn comment_markers_inside_strings_survive() {
        let raw = b"#1=NAME('a /* not a comment */ b','it''s');/*x*/";
        assert_eq!(
            tolerant_step_text(raw),
            "#1=NAME('a /* not a comment */ b','it''s'); "
        );
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let raw = b"DATA;\xff\xfe#1=X();";
        let text = tolerant_step_text(raw);
        assert!(text.starts_with("DATA;"));
        assert!(text.ends_with("#1=X();"));
    }
}
