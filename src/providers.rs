//! # Execution Provider Negotiation
//!
//! Maps the requested acceleration keywords (`cpu`, `cuda`, ...) onto the
//! providers available on this host and suggests a worker-thread budget.
//! The result is handed to frame processors opaquely.

use crate::tool_resolver::ToolPathResolver;
use tracing::debug;

const PROVIDER_SUFFIX: &str = "ExecutionProvider";

/// Providers considered GPU-class when suggesting a thread count
const GPU_CLASS: &[&str] = &["cuda", "tensorrt", "rocm"];

/// Providers available on a host, in preference order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionProviders {
    available: Vec<String>,
}

impl ExecutionProviders {
    pub fn new(available: Vec<String>) -> Self {
        Self { available }
    }

    /// Probe the host for acceleration backends
    pub fn detect(resolver: &ToolPathResolver) -> Self {
        let mut available = Vec::new();
        if resolver.is_tool_available("nvidia-smi") {
            available.push("CUDAExecutionProvider".to_string());
        }
        if cfg!(target_os = "macos") {
            available.push("CoreMLExecutionProvider".to_string());
        }
        if cfg!(windows) {
            available.push("DmlExecutionProvider".to_string());
        }
        available.push("CPUExecutionProvider".to_string());

        debug!("Available execution providers: {:?}", available);
        Self { available }
    }

    /// Short lower-case names, e.g. `CUDAExecutionProvider` -> `cuda`
    pub fn encoded(&self) -> Vec<String> {
        self.available.iter().map(|provider| encode(provider)).collect()
    }

    /// Available providers whose short name contains any requested keyword
    pub fn negotiate<S: AsRef<str>>(&self, requested: &[S]) -> Vec<String> {
        let requested: Vec<String> = requested
            .iter()
            .map(|keyword| keyword.as_ref().to_lowercase())
            .collect();

        self.available
            .iter()
            .filter(|provider| {
                let encoded = encode(provider);
                requested.iter().any(|keyword| encoded.contains(keyword.as_str()))
            })
            .cloned()
            .collect()
    }

    /// 8 workers with a GPU-class provider, otherwise serial
    pub fn suggest_threads(&self) -> usize {
        let has_gpu = self
            .encoded()
            .iter()
            .any(|name| GPU_CLASS.contains(&name.as_str()));
        if has_gpu {
            8
        } else {
            1
        }
    }
}

fn encode(provider: &str) -> String {
    provider.replace(PROVIDER_SUFFIX, "").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(names: &[&str]) -> ExecutionProviders {
        ExecutionProviders::new(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_encoded_names() {
        let providers = host(&["CUDAExecutionProvider", "CPUExecutionProvider"]);
        assert_eq!(providers.encoded(), vec!["cuda", "cpu"]);
    }

    #[test]
    fn test_negotiate_matches_by_substring() {
        let providers = host(&[
            "TensorrtExecutionProvider",
            "CUDAExecutionProvider",
            "CPUExecutionProvider",
        ]);

        assert_eq!(providers.negotiate(&["cuda"]), vec!["CUDAExecutionProvider"]);
        assert_eq!(providers.negotiate(&["CPU"]), vec!["CPUExecutionProvider"]);
        assert_eq!(
            providers.negotiate(&["cpu", "tensor"]),
            vec!["TensorrtExecutionProvider", "CPUExecutionProvider"]
        );
        assert!(providers.negotiate(&["rocm"]).is_empty());
        assert!(providers.negotiate::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_suggest_threads() {
        assert_eq!(host(&["CPUExecutionProvider"]).suggest_threads(), 1);
        assert_eq!(
            host(&["CUDAExecutionProvider", "CPUExecutionProvider"]).suggest_threads(),
            8
        );
        assert_eq!(host(&["DmlExecutionProvider"]).suggest_threads(), 1);
    }

    #[test]
    fn test_detect_always_offers_cpu() {
        let providers = ExecutionProviders::detect(&ToolPathResolver::with_search_path(Vec::new()));
        assert!(providers.encoded().contains(&"cpu".to_string()));
        assert!(!providers.encoded().contains(&"cuda".to_string()));
    }
}
