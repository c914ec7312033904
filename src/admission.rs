use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube_core::admission::{
    AdmissionRequest, AdmissionResponse, AdmissionReview, META_API_VERSION_V1, META_KIND,
};
use kube_core::{DynamicObject, TypeMeta};
use serde_json::Value;

use crate::injector::{Injector, pod_name};
use crate::patch;
use crate::store::ConfigStore;

const JSON_CONTENT_TYPE: &str = "application/json";

/// What to send back for one admission call.
#[derive(Debug)]
pub enum Reply {
    Review(AdmissionReview<DynamicObject>),
    /// The request cannot be answered with a review since there is no uid to
    /// answer to.
    Drop(String),
}

/// Fields recovered from the raw body, before the envelope is decoded.
struct Envelope {
    uid: Option<String>,
    api_version: String,
}

impl Envelope {
    fn recover(value: &Value) -> Self {
        let uid = value
            .pointer("/request/uid")
            .and_then(Value::as_str)
            .filter(|uid| !uid.is_empty())
            .map(str::to_string);
        let api_version = value
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or(META_API_VERSION_V1)
            .to_string();

        Self { uid, api_version }
    }

    fn deny(self, reason: String) -> Reply {
        let Some(uid) = self.uid else {
            return Reply::Drop(reason);
        };

        warn!(message = "admission denied", %uid, %reason);

        let mut response = AdmissionResponse::invalid(reason);
        response.uid = uid;
        response.types = TypeMeta {
            api_version: self.api_version,
            kind: META_KIND.to_string(),
        };

        Reply::Review(response.into_review())
    }
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(JSON_CONTENT_TYPE))
}

fn is_pod(req: &AdmissionRequest<DynamicObject>) -> bool {
    let resource = &req.resource;
    resource.group.is_empty() && resource.version == "v1" && resource.resource == "pods"
}

fn deny(req: &AdmissionRequest<DynamicObject>, reason: String) -> Reply {
    warn!(message = "admission denied", uid = %req.uid, %reason);

    Reply::Review(AdmissionResponse::from(req).deny(reason).into_review())
}

pub struct AdmissionHandler {
    store: Arc<ConfigStore>,
}

impl AdmissionHandler {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    pub fn review(&self, content_type: Option<&str>, body: &[u8]) -> Reply {
        let mut value = match serde_json::from_slice::<Value>(body) {
            Ok(value) => value,
            Err(err) => return Reply::Drop(format!("request body is not json, {err}")),
        };

        let envelope = Envelope::recover(&value);
        if !is_json(content_type) {
            return envelope.deny(format!(
                "invalid Content-Type {:?}, expect {JSON_CONTENT_TYPE}",
                content_type.unwrap_or_default()
            ));
        }

        // the pod is decoded from the untouched object, not from the one
        // that went through DynamicObject
        let raw = value.pointer_mut("/request/object").map(Value::take);

        let review = match serde_json::from_value::<AdmissionReview<DynamicObject>>(value) {
            Ok(review) => review,
            Err(err) => return envelope.deny(format!("decode admission review failed, {err}")),
        };
        let req: AdmissionRequest<DynamicObject> = match review.try_into() {
            Ok(req) => req,
            Err(_) => return envelope.deny("admission review has no request".to_string()),
        };

        if !is_pod(&req) {
            return deny(&req, "expect resource to be pods.v1".to_string());
        }

        let Some(raw) = raw.filter(|raw| !raw.is_null()) else {
            return deny(&req, "admission request has no object".to_string());
        };
        let mut pod = match serde_json::from_value::<Pod>(raw) {
            Ok(pod) => pod,
            Err(err) => return deny(&req, format!("decode pod failed, {err}")),
        };

        // normalized, so fields Pod does not model never show up in the patch
        let original = match serde_json::to_value(&pod) {
            Ok(original) => original,
            Err(err) => return deny(&req, format!("encode pod failed, {err}")),
        };

        let injector = Injector::new(self.store.injector());
        if let Err(err) = injector.mutate(&mut pod) {
            return deny(&req, err.to_string());
        }

        let response = AdmissionResponse::from(&req);
        let response = match patch::diff(&original, &pod) {
            Ok(None) => {
                debug!(message = "admitted without patch", uid = %req.uid, pod = %pod_name(&pod));
                response
            }
            Ok(Some(patch)) => {
                let operations = patch.0.len();
                match response.with_patch(patch) {
                    Ok(response) => {
                        info!(
                            message = "admitted with patch",
                            uid = %req.uid,
                            pod = %pod_name(&pod),
                            operations
                        );
                        response
                    }
                    Err(err) => return deny(&req, format!("encode patch failed, {err}")),
                }
            }
            Err(err) => return deny(&req, err.to_string()),
        };

        Reply::Review(response.into_review())
    }
}
