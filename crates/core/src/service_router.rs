//! Model selection: resolves a requested model name to a service + effective model.

const FOUNDATION_SENTINEL: &str = "foundation";

/// A model-serving backend the router can hand a resolved request to. The behavior
/// behind each variant belongs to the Inference Backend and is out of scope here;
/// only what the resolver needs (availability, installed models) is modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelService {
    SystemDefault,
    LocalMlx,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Service {
        service: ModelService,
        effective_model: String,
    },
    None,
}

/// Resolver inputs: whether `SystemDefault` is available, and the locally-installed models.
pub struct ServiceRouter {
    pub system_default_available: bool,
    pub installed_models: Vec<String>,
}

impl ServiceRouter {
    pub fn new(system_default_available: bool, installed_models: Vec<String>) -> Self {
        Self {
            system_default_available,
            installed_models,
        }
    }

    /// Resolve `requested_model` per the ordered rules below.
    pub fn resolve(&self, requested_model: &str) -> Resolution {
        if requested_model.eq_ignore_ascii_case(FOUNDATION_SENTINEL) && self.system_default_available {
            return Resolution::Service {
                service: ModelService::SystemDefault,
                effective_model: FOUNDATION_SENTINEL.to_string(),
            };
        }

        if let Some(canonical) = self.match_installed(requested_model) {
            return Resolution::Service {
                service: ModelService::LocalMlx,
                effective_model: canonical,
            };
        }

        if self.installed_models.is_empty() && self.system_default_available {
            return Resolution::Service {
                service: ModelService::SystemDefault,
                effective_model: FOUNDATION_SENTINEL.to_string(),
            };
        }

        Resolution::None
    }

    /// Case-insensitive match against installed models, accepting `name:tag` by
    /// stripping the tag before comparing.
    fn match_installed(&self, requested_model: &str) -> Option<String> {
        let requested_base = strip_tag(requested_model).to_lowercase();
        self.installed_models
            .iter()
            .find(|installed| strip_tag(installed).to_lowercase() == requested_base)
            .cloned()
    }
}

fn strip_tag(name: &str) -> &str {
    name.split(':').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foundation_sentinel_resolves_to_system_default() {
        let router = ServiceRouter::new(true, vec![]);
        let res = router.resolve("foundation");
        assert_eq!(
            res,
            Resolution::Service {
                service: ModelService::SystemDefault,
                effective_model: "foundation".to_string(),
            }
        );
    }

    #[test]
    fn installed_model_resolves_case_insensitively_with_tag_stripped() {
        let router = ServiceRouter::new(false, vec!["Llama3.2:latest".to_string()]);
        let res = router.resolve("llama3.2");
        assert_eq!(
            res,
            Resolution::Service {
                service: ModelService::LocalMlx,
                effective_model: "Llama3.2:latest".to_string(),
            }
        );
    }

    #[test]
    fn no_installed_models_falls_back_to_system_default() {
        let router = ServiceRouter::new(true, vec![]);
        let res = router.resolve("anything");
        assert_eq!(
            res,
            Resolution::Service {
                service: ModelService::SystemDefault,
                effective_model: "foundation".to_string(),
            }
        );
    }

    #[test]
    fn nothing_available_resolves_to_none() {
        let router = ServiceRouter::new(false, vec!["other".to_string()]);
        assert_eq!(router.resolve("missing"), Resolution::None);
    }
}
