use crate::error::WebSocketError;

/// Pick the first client-requested sub-protocol the server supports.
///
/// Returns `Ok(None)` when either side offers nothing.
pub fn negotiate_sub_protocol(
    server: &[String],
    client: &[String],
) -> Result<Option<String>, WebSocketError> {
    if server.is_empty() || client.is_empty() {
        return Ok(None);
    }
    client
        .iter()
        .find(|requested| server.contains(requested))
        .cloned()
        .map(Some)
        .ok_or_else(|| {
            WebSocketError::SubProtocol(format!(
                "none of [{}] supported",
                client.join(", ")
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_client_order_wins() {
        let server = list(&["chat", "superchat"]);
        let client = list(&["superchat", "chat"]);
        assert_eq!(
            negotiate_sub_protocol(&server, &client).unwrap(),
            Some("superchat".to_string())
        );
    }

    #[test]
    fn test_empty_lists_select_nothing() {
        assert_eq!(negotiate_sub_protocol(&[], &list(&["chat"])).unwrap(), None);
        assert_eq!(negotiate_sub_protocol(&list(&["chat"]), &[]).unwrap(), None);
    }

    #[test]
    fn test_disjoint_lists_fail() {
        let err = negotiate_sub_protocol(&list(&["chat"]), &list(&["mqtt"])).unwrap_err();
        assert!(matches!(err, WebSocketError::SubProtocol(_)));
    }
}
