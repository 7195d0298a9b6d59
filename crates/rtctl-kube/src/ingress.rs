//! Ingress controller catalog and ingress class selection

use k8s_openapi::api::networking::v1::IngressClass;

use crate::error::{KubeError, Result};

/// Known ingress controllers, keyed by the `spec.controller` of their class
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressController {
    Nginx,
    NginxEnterprise,
    Alb,
    Traefik,
    Ambassador,
    Istio,
    Contour,
    Other(String),
}

impl IngressController {
    pub fn from_controller(controller: &str) -> Self {
        match controller {
            "k8s.io/ingress-nginx" => Self::Nginx,
            "nginx.org/ingress-controller" => Self::NginxEnterprise,
            "ingress.k8s.aws/alb" => Self::Alb,
            "traefik.io/ingress-controller" => Self::Traefik,
            "getambassador.io/ingress-controller" => Self::Ambassador,
            "istio.io/ingress-controller" => Self::Istio,
            "projectcontour.io/ingress-controller" => Self::Contour,
            other => Self::Other(other.to_string()),
        }
    }

    /// Controller name as found on the ingress class
    pub fn name(&self) -> &str {
        match self {
            Self::Nginx => "k8s.io/ingress-nginx",
            Self::NginxEnterprise => "nginx.org/ingress-controller",
            Self::Alb => "ingress.k8s.aws/alb",
            Self::Traefik => "traefik.io/ingress-controller",
            Self::Ambassador => "getambassador.io/ingress-controller",
            Self::Istio => "istio.io/ingress-controller",
            Self::Contour => "projectcontour.io/ingress-controller",
            Self::Other(name) => name,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// ALB ingresses are managed outside of the runtime
    pub fn creates_workflows_ingress(&self) -> bool {
        !matches!(self, Self::Alb)
    }

    /// NGINX enterprise routes every runtime ingress through a master ingress
    pub fn needs_master_ingress(&self) -> bool {
        matches!(self, Self::NginxEnterprise)
    }

    /// Annotations this controller needs on the runtime's own ingresses
    pub fn decorations(&self) -> Vec<(&'static str, &'static str)> {
        match self {
            Self::NginxEnterprise => vec![(MERGEABLE_INGRESS_TYPE, "minion")],
            _ => Vec::new(),
        }
    }
}

/// NGINX enterprise annotation pairing minion ingresses with their master
pub const MERGEABLE_INGRESS_TYPE: &str = "nginx.org/mergeable-ingress-type";

impl std::fmt::Display for IngressController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An ingress class with its parsed controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressClassInfo {
    pub name: String,
    pub controller: IngressController,
}

/// Result of ingress class selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressSelection {
    /// A single class was requested or found
    Selected(IngressClassInfo),
    /// Several candidates, the operator has to choose
    Ambiguous(Vec<IngressClassInfo>),
}

/// Ingress classes whose controller is supported (all of them with `bypass`)
pub fn usable_classes(classes: &[IngressClass], bypass: bool) -> Vec<IngressClassInfo> {
    classes
        .iter()
        .filter_map(|class| {
            let name = class.metadata.name.clone()?;
            let controller = class
                .spec
                .as_ref()
                .and_then(|spec| spec.controller.as_deref())
                .map(IngressController::from_controller)?;
            (bypass || controller.is_supported()).then_some(IngressClassInfo { name, controller })
        })
        .collect()
}

/// Pick the ingress class to install with.
///
/// A requested class must be usable. Without a request, a single usable class
/// is picked automatically and several are returned for the caller to choose.
pub fn select_ingress_class(
    classes: &[IngressClass],
    requested: Option<&str>,
    bypass: bool,
) -> Result<IngressSelection> {
    let mut usable = usable_classes(classes, bypass);

    if let Some(requested) = requested.filter(|r| !r.is_empty()) {
        return usable
            .into_iter()
            .find(|c| c.name == requested)
            .map(IngressSelection::Selected)
            .ok_or_else(|| KubeError::IngressClass {
                message: format!("ingress class '{}' is not supported", requested),
            });
    }

    match usable.len() {
        0 => Err(KubeError::IngressClass {
            message: "no ingress classes of the supported types were found".to_string(),
        }),
        1 => Ok(IngressSelection::Selected(usable.remove(0))),
        _ => Ok(IngressSelection::Ambiguous(usable)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::networking::v1::IngressClassSpec;
    use kube::api::ObjectMeta;

    fn class(name: &str, controller: &str) -> IngressClass {
        IngressClass {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(IngressClassSpec {
                controller: Some(controller.to_string()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_controller_round_trip_names() {
        let c = IngressController::from_controller("k8s.io/ingress-nginx");
        assert_eq!(c, IngressController::Nginx);
        assert_eq!(c.name(), "k8s.io/ingress-nginx");
        assert!(!IngressController::from_controller("example.com/custom").is_supported());
        assert!(!IngressController::Alb.creates_workflows_ingress());
    }

    #[test]
    fn test_only_nginx_enterprise_is_decorated() {
        let enterprise = IngressController::from_controller("nginx.org/ingress-controller");
        assert!(enterprise.needs_master_ingress());
        assert_eq!(enterprise.decorations(), vec![(MERGEABLE_INGRESS_TYPE, "minion")]);

        assert!(!IngressController::Nginx.needs_master_ingress());
        assert!(IngressController::Nginx.decorations().is_empty());
    }

    #[test]
    fn test_single_supported_class_is_selected() {
        let classes = vec![class("nginx", "k8s.io/ingress-nginx"), class("custom", "example.com/x")];
        let selection = select_ingress_class(&classes, None, false).unwrap();
        assert_eq!(
            selection,
            IngressSelection::Selected(IngressClassInfo {
                name: "nginx".to_string(),
                controller: IngressController::Nginx,
            })
        );
    }

    #[test]
    fn test_requested_class_must_be_supported() {
        let classes = vec![class("nginx", "k8s.io/ingress-nginx"), class("custom", "example.com/x")];
        let err = select_ingress_class(&classes, Some("custom"), false).unwrap_err();
        assert!(err.to_string().contains("'custom' is not supported"));

        let bypassed = select_ingress_class(&classes, Some("custom"), true).unwrap();
        assert!(matches!(bypassed, IngressSelection::Selected(c) if c.name == "custom"));
    }

    #[test]
    fn test_no_supported_classes() {
        let classes = vec![class("custom", "example.com/x")];
        assert!(select_ingress_class(&classes, None, false).is_err());
        assert!(select_ingress_class(&[], None, true).is_err());
    }

    #[test]
    fn test_multiple_classes_are_ambiguous() {
        let classes = vec![
            class("nginx", "k8s.io/ingress-nginx"),
            class("traefik", "traefik.io/ingress-controller"),
        ];
        match select_ingress_class(&classes, None, false).unwrap() {
            IngressSelection::Ambiguous(options) => assert_eq!(options.len(), 2),
            other => panic!("expected ambiguous selection, got {:?}", other),
        }
    }
}
