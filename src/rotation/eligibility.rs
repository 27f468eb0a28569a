use chrono::{DateTime, Utc};

use crate::config::{AccessTokenPolicy, ManagedGroup};
use crate::gitlab::AccessToken;

/// A remote token paired with the policy whose name matched it.
#[derive(Debug, Clone)]
pub struct TokenPair<'a> {
    pub remote: AccessToken,
    pub policy: &'a AccessTokenPolicy,
}

/// Pair every policy of `group`, in declaration order, with the first
/// non-revoked remote token carrying the same name.
///
/// Policies without a match are skipped. A matched token without an expiry
/// date is dropped here, so it is never renewed even when forced.
pub fn match_policies<'a>(group: &'a ManagedGroup, remote: &[AccessToken]) -> Vec<TokenPair<'a>> {
    let mut pairs = Vec::new();

    for policy in &group.tokens {
        let mut found = None;
        for token in remote {
            if token.revoked {
                tracing::debug!(
                    path = %group.path,
                    token_id = token.id,
                    "access token is revoked, skip it"
                );
                continue;
            }
            if token.name == policy.name {
                found = Some(token);
                break;
            }
        }

        match found {
            None => {
                tracing::warn!(path = %group.path, token = %policy.name, "token is not found");
            }
            Some(token) if token.expires_at.is_none() => {
                tracing::debug!(
                    path = %group.path,
                    token = %policy.name,
                    "token has no expiry date, skip it"
                );
            }
            Some(token) => pairs.push(TokenPair {
                remote: token.clone(),
                policy,
            }),
        }
    }

    pairs
}

/// `now + renew_before` has reached the expiry date. A renewal window
/// reaching past the last representable date is always due.
pub fn is_due(pair: &TokenPair<'_>, now: DateTime<Utc>) -> bool {
    match pair.remote.expires_at {
        Some(expires_at) => now
            .checked_add_signed(pair.policy.renew_before)
            .map_or(true, |limit| limit >= expires_at),
        None => false,
    }
}
