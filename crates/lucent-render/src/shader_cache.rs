//! Runtime shader compilation with an on-disk SPIR-V cache.
//!
//! Compiled modules are cached next to their GLSL source as
//! `<source>_<stage>.spv`; a present cache file skips recompilation.

use shaderc::{Compiler, ShaderKind};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Shader pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Suffix used in cache file names.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Fragment => "frag",
            Self::Compute => "comp",
        }
    }

    fn kind(self) -> ShaderKind {
        match self {
            Self::Vertex => ShaderKind::Vertex,
            Self::Fragment => ShaderKind::Fragment,
            Self::Compute => ShaderKind::Compute,
        }
    }
}

/// Errors from shader compilation or cache I/O.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to initialize shader compiler")]
    CompilerUnavailable,
    #[error("Shader compilation failed for {path}: {message}")]
    Compilation { path: PathBuf, message: String },
    #[error("Cached SPIR-V at {0} is malformed")]
    MalformedCache(PathBuf),
}

/// Cache file path for a shader source and stage.
pub fn cache_path(source: &Path, stage: ShaderStage) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{stem}_{}.spv", stage.suffix()))
}

/// Load a shader, compiling it only when no cached SPIR-V exists.
pub fn load_shader(source: &Path, stage: ShaderStage) -> Result<Vec<u32>, ShaderError> {
    let cached = cache_path(source, stage);

    if cached.exists() {
        tracing::debug!(path = %cached.display(), "using cached SPIR-V");
        return read_spirv(&cached);
    }

    let words = compile_shader(source, stage)?;
    write_spirv(&cached, &words)?;
    Ok(words)
}

/// Compile GLSL source for the given stage, bypassing the cache.
pub fn compile_shader(source: &Path, stage: ShaderStage) -> Result<Vec<u32>, ShaderError> {
    let text = fs::read_to_string(source).map_err(|e| ShaderError::Io {
        path: source.to_path_buf(),
        source: e,
    })?;

    let compiler = Compiler::new().map_err(|_| ShaderError::CompilerUnavailable)?;
    let mut options =
        shaderc::CompileOptions::new().map_err(|_| ShaderError::CompilerUnavailable)?;
    options.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_3 as u32,
    );
    options.set_target_spirv(shaderc::SpirvVersion::V1_6);
    options.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let file_name = source
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let artifact = compiler
        .compile_into_spirv(&text, stage.kind(), &file_name, "main", Some(&options))
        .map_err(|e| ShaderError::Compilation {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;

    if artifact.get_num_warnings() > 0 {
        tracing::warn!(
            path = %source.display(),
            "{}",
            artifact.get_warning_messages().trim_end()
        );
    }

    Ok(artifact.as_binary().to_vec())
}

fn read_spirv(path: &Path) -> Result<Vec<u32>, ShaderError> {
    let bytes = fs::read(path).map_err(|e| ShaderError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    if bytes.len() % 4 != 0 {
        return Err(ShaderError::MalformedCache(path.to_path_buf()));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn write_spirv(path: &Path, words: &[u32]) -> Result<(), ShaderError> {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    fs::write(path, bytes).map_err(|e| ShaderError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_names() {
        assert_eq!(
            cache_path(Path::new("shaders/basic.vert.glsl"), ShaderStage::Vertex),
            PathBuf::from("shaders/basic.vert_vert.spv")
        );
        assert_eq!(
            cache_path(Path::new("tri.frag"), ShaderStage::Fragment),
            PathBuf::from("tri_frag.spv")
        );
    }

    #[test]
    fn spirv_round_trips_through_cache_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("x_comp.spv");
        let words = vec![0x0723_0203, 42, 7];

        write_spirv(&path, &words).unwrap();
        assert_eq!(read_spirv(&path).unwrap(), words);
    }

    #[test]
    fn odd_sized_cache_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bad.spv");
        fs::write(&path, [1u8, 2, 3]).unwrap();

        assert!(matches!(
            read_spirv(&path),
            Err(ShaderError::MalformedCache(_))
        ));
    }

    #[test]
    fn missing_source_is_io_error() {
        let result = compile_shader(Path::new("does/not/exist.vert"), ShaderStage::Vertex);
        assert!(matches!(result, Err(ShaderError::Io { .. })));
    }
}
