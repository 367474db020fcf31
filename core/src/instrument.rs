use std::path::Path;
use std::path::PathBuf;

use uuid::Uuid;

use crate::error::ExecError;
use crate::marker::INPUT_REQUEST_DELIMITER;

/// Wraps user code so the interpreter announces every blocking `input()` call
/// with a delimited marker before it suspends on stdin.
///
/// The wrapper must not change anything else the program can observe: the
/// prompt is no longer echoed by `input` itself (it travels inside the
/// marker), and the read plus its return value stay untouched.
fn instrumented_source(code: &str) -> String {
    format!(
        r#"import builtins
import json

_original_input = builtins.input

def _wrapped_input(prompt=""):
    print("{delim}" + json.dumps({{"prompt": str(prompt)}}) + "{delim}", end="", flush=True)
    return _original_input()

builtins.input = _wrapped_input

{code}
"#,
        delim = INPUT_REQUEST_DELIMITER,
    )
}

/// The instrumented-source file backing one run, exclusively owned by that
/// run until cleanup.
///
/// Every exit path is expected to call [`CodeArtifact::remove`]; `Drop` is
/// only the backstop for paths that never reach it.
#[derive(Debug)]
pub struct CodeArtifact {
    path: PathBuf,
    removed: bool,
}

impl CodeArtifact {
    /// Writes the instrumented source under an unpredictable per-run name so
    /// concurrent sessions sharing one scratch directory cannot collide.
    pub async fn write(scratch_dir: &Path, code: &str) -> Result<Self, ExecError> {
        let path = scratch_dir.join(format!("runcell-{}.py", Uuid::new_v4()));
        tokio::fs::write(&path, instrumented_source(code))
            .await
            .map_err(ExecError::write_artifact)?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the artifact. Failures are logged, never fatal.
    pub async fn remove(mut self) {
        self.removed = true;
        if let Err(err) = tokio::fs::remove_file(&self.path).await
            && err.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove instrumented source artifact"
            );
        }
    }
}

impl Drop for CodeArtifact {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
