/// Label carrying the instance runmode.
pub const LABEL_RUNMODE: &str = "runmode";
/// Label carrying the owning deployment name.
pub const LABEL_DEPLOYMENT: &str = "deployment";
/// Label carrying the instance name.
pub const LABEL_NAME: &str = "name";
pub const LABEL_APP: &str = "app";
pub const LABEL_VENDOR: &str = "vendor";

pub const APP_AEM: &str = "aem";
pub const VENDOR_ADOBE: &str = "adobe";

/// Annotation set to `"true"` once credentials were bootstrapped.
pub const ANNOTATION_INITIALIZED: &str = "initialized";

/// Administrative user inside every AEM instance.
pub const ADMIN_USER: &str = "admin";
/// Factory-default password of [`ADMIN_USER`].
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

/// Kind reported by owner references pointing at a deployment.
pub const DEPLOYMENT_KIND: &str = "AEMDeployment";
