use crate::core::ports::tokener::{Payload, Tokener};
use crate::error::Error;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

/// HS256 session tokens.
pub struct JWT {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JWT {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

impl<P> Tokener<P> for JWT
where
    P: Payload,
{
    fn gen_token(&self, payload: &P) -> Result<String, Error> {
        let token = encode(&Header::new(Algorithm::HS256), payload, &self.encoding)?;
        Ok(token)
    }

    fn verify_token(&self, token: &str) -> Result<P, Error> {
        let payload = decode(token, &self.decoding, &Validation::new(Algorithm::HS256))?;
        Ok(payload.claims)
    }
}
