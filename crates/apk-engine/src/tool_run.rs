use std::path::Path;

use apkshell_android_toolchain::ToolContext;
use apkshell_core::{ProcessResult, Tool};
use tracing::debug;

use crate::EngineError;

/// `-Xmx<N>m -jar <jar>`
pub(crate) async fn jar_invocation(context: &ToolContext, jar: Tool) -> Result<Vec<String>, EngineError> {
    let jar = context.require(jar).await?;
    Ok(vec![context.heap_arg(), "-jar".to_string(), jar.display().to_string()])
}

/// Free-form extra arguments, split on whitespace
pub(crate) fn split_extra_args(extra: &str) -> impl Iterator<Item = String> + '_ {
    extra.split_whitespace().map(String::from)
}

/// Run `program` and turn a non-zero exit into a failure
pub(crate) async fn run_checked(
    context: &ToolContext,
    label: &'static str,
    program: &Path,
    args: &[String],
    timeout_secs: u64,
) -> Result<ProcessResult, EngineError> {
    let result = context.runner().run(program, args, timeout_secs).await;
    debug!("{} exited with {}", label, result.code);
    if result.success() {
        Ok(result)
    } else {
        Err(EngineError::ToolFailed {
            tool: label,
            detail: result.failure_detail(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_extra_args() {
        let args: Vec<String> = split_extra_args("  --force-manifest \t -p  /tmp/fw ").collect();
        assert_eq!(args, vec!["--force-manifest", "-p", "/tmp/fw"]);
        assert_eq!(split_extra_args("").count(), 0);
    }
}
