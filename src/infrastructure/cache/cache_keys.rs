pub fn user_balances_key(user_id: &str) -> String {
    format!("user_balances:{}", user_id)
}
