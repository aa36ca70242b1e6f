use std::str::FromStr;

use ethereum_types::Secret;
use serde::Deserialize;

/// The signing key of the processor.
///
/// Accepts a `0x` prefixed hex string or `$VAR`, naming an environment
/// variable holding the hex string.
#[derive(Clone)]
pub struct PrivateKey(Secret);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").finish()
    }
}

impl From<Secret> for PrivateKey {
    fn from(secret: Secret) -> Self {
        PrivateKey(secret)
    }
}

impl std::ops::Deref for PrivateKey {
    type Target = Secret;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PrivateKey {
    fn parse<E: serde::de::Error>(value: &str) -> Result<Secret, E> {
        Secret::from_str(value).map_err(|e| {
            E::custom(format!(
                "{e}\n expected a 66 chars string (including the 0x prefix) but found {} chars",
                value.len()
            ))
        })
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrivateKeyVistor;
        impl<'de> serde::de::Visitor<'de> for PrivateKeyVistor {
            type Value = Secret;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "hex string or an env var containing a hex string in it",
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if let Some(var) = value.strip_prefix('$') {
                    tracing::trace!("Reading {} from env", var);
                    let val = std::env::var(var).map_err(|e| {
                        E::custom(format!(
                            "error while loading this env {var}: {e}",
                        ))
                    })?;
                    PrivateKey::parse(val.trim())
                } else if value.starts_with("0x") {
                    PrivateKey::parse(value)
                } else {
                    Err(E::custom(
                        "private key must be 0x prefixed hex or a $ENV_VAR",
                    ))
                }
            }
        }

        let secret = deserializer.deserialize_str(PrivateKeyVistor)?;
        Ok(Self(secret))
    }
}
