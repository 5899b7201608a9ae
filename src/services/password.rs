use bcrypt::{hash, verify, BcryptError, DEFAULT_COST};

pub struct PasswordService;

impl PasswordService {
    pub fn hash(password: &str) -> Result<String, BcryptError> {
        hash(password, DEFAULT_COST)
    }

    /// A malformed stored hash counts as a mismatch.
    pub fn verify(password: &str, password_hash: &str) -> bool {
        verify(password, password_hash).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_only_the_original_password() {
        let hashed = bcrypt::hash("correct horse", 4).unwrap();
        assert!(PasswordService::verify("correct horse", &hashed));
        assert!(!PasswordService::verify("battery staple", &hashed));
        assert!(!PasswordService::verify("correct horse", "not-a-bcrypt-hash"));
    }
}
