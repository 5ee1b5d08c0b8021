/// Derive the Matrix user id for an external IdP username. Pure function of
/// its inputs; nothing is persisted about the mapping.
pub fn matrix_user_id(external_id: &str, server_name: &str) -> String {
    format!("@{}:{}", external_id, server_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(
            matrix_user_id("alice", "example.org"),
            "@alice:example.org"
        );
        assert_eq!(
            matrix_user_id("alice", "example.org"),
            matrix_user_id("alice", "example.org")
        );
    }
}
