//! Naming rules tying instances, their resources and their hosts together.
//!
//! Instance names have the form `{deployment}-{runmode}-{ordinal:03}`; every
//! per-instance resource name and host is derived from it.

use crate::{
    APP_AEM, LABEL_APP, LABEL_DEPLOYMENT, LABEL_NAME, LABEL_RUNMODE, LABEL_VENDOR, Labels,
    Runmode, VENDOR_ADOBE,
};

/// Splits `name` into its parent and trailing numeric ordinal.
///
/// `"foo-bar-007"` yields `("foo-bar", 7)`. A name without a numeric suffix
/// has an empty parent and ordinal `-1`; a suffix that does not fit an
/// `i32` keeps its parent but reports ordinal `-1`.
pub fn parse_parent_and_ordinal(name: &str) -> (String, i64) {
    let Some((parent, suffix)) = name.rsplit_once('-') else {
        return (String::new(), -1);
    };
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return (String::new(), -1);
    }
    let ordinal = suffix.parse::<i32>().map(i64::from).unwrap_or(-1);
    (parent.to_string(), ordinal)
}

/// Zero-padded ordinal segment, e.g. `7` → `"007"`.
#[inline]
pub fn ordinal_id(ordinal: u32) -> String {
    format!("{ordinal:03}")
}

/// Canonical name for an instance, e.g. `example-aem-publish-001`.
pub fn instance_name(deployment: &str, runmode: Runmode, ordinal: u32) -> String {
    make_instance_name(deployment, runmode.as_str(), &ordinal_id(ordinal))
}

fn make_instance_name(deployment: &str, runmode: &str, id: &str) -> String {
    format!("{deployment}-{runmode}-{id}")
}

/// `{instance}.{service}.{namespace}`.
pub fn instance_host(instance: &str, service: &str, namespace: &str) -> String {
    format!("{instance}.{service}.{namespace}")
}

/// Host of the publisher paired with `dispatcher` by ordinal.
///
/// `example-aem-dispatcher-001` in deployment `example-aem`, namespace
/// `demo` maps to `example-aem-publish-001.example-aem.demo`. A name without
/// any `-` segment maps to `localhost`.
pub fn match_publish_host(dispatcher: &str, deployment: &str, namespace: &str) -> String {
    let Some((_, id)) = dispatcher.rsplit_once('-') else {
        return "localhost".to_string();
    };
    let publish = make_instance_name(deployment, Runmode::Publish.as_str(), id);
    instance_host(&publish, deployment, namespace)
}

/// Dispatcher paired with `publish` by ordinal.
pub fn dispatcher_for_publish(publish: &str) -> String {
    publish.replace("-publish-", "-dispatcher-")
}

/// `{instance}-pvc`.
pub fn claim_name(instance: &str) -> String {
    format!("{instance}-pvc")
}

/// `{instance}-controller-svc`.
pub fn service_name(instance: &str) -> String {
    format!("{instance}-controller-svc")
}

/// `{instance}-ingress`.
pub fn ingress_name(instance: &str) -> String {
    format!("{instance}-ingress")
}

/// Externally routable host of an instance endpoint.
pub fn ingress_host(instance: &str, namespace: &str, external_domain: &str) -> String {
    format!("{instance}-{namespace}.{external_domain}")
}

/// Selector matching every instance of `deployment`.
pub fn labels_for_deployment(deployment: &str) -> Labels {
    Labels::from([
        (LABEL_DEPLOYMENT.to_string(), deployment.to_string()),
        (LABEL_APP.to_string(), APP_AEM.to_string()),
    ])
}

/// Full label set stamped on a new instance.
pub fn instance_labels(instance: &str, runmode: Runmode, deployment: &str) -> Labels {
    let mut labels = labels_for_deployment(deployment);
    labels.insert(LABEL_VENDOR.to_string(), VENDOR_ADOBE.to_string());
    labels.insert(LABEL_RUNMODE.to_string(), runmode.as_str().to_string());
    labels.insert(LABEL_NAME.to_string(), instance.to_string());
    labels
}

/// Whether `labels` satisfies every entry of `selector`.
pub fn selector_matches(selector: &Labels, labels: &Labels) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}
