use serde::Serialize;

/// Information the bundler indexes for a transformed file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_exports: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_cjs_exports: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub react_server_actions: Option<ReactServerActions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub react_server_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub react_client_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expo_dom_component_reference: Option<String>,
}

/// Payload of the `rsc/actions:` comment. The serialized form is parsed by
/// the bundler, so field order and names are fixed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReactServerActions {
    pub id: String,
    pub names: Vec<String>,
}

impl ReactServerActions {
    pub const COMMENT_PREFIX: &'static str = "rsc/actions: ";

    pub fn to_comment_text(&self) -> serde_json::Result<String> {
        Ok(format!("{}{}", Self::COMMENT_PREFIX, serde_json::to_string(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_comment_wire_format() {
        let actions = ReactServerActions {
            id: "file:///app/actions.js".into(),
            names: vec!["foo".into(), "default".into()],
        };

        assert_eq!(
            actions.to_comment_text().unwrap(),
            r#"rsc/actions: {"id":"file:///app/actions.js","names":["foo","default"]}"#
        );
    }

    #[test]
    fn skips_absent_fields() {
        let metadata = TransformMetadata {
            proxy_exports: Some(vec!["Pattern".into()]),
            has_cjs_exports: Some(false),
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_string(&metadata).unwrap(),
            r#"{"proxyExports":["Pattern"],"hasCjsExports":false}"#
        );
    }
}
