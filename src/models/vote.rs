use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vote_polarity", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VotePolarity {
    Like,
    Dislike,
}

impl VotePolarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            VotePolarity::Like => "like",
            VotePolarity::Dislike => "dislike",
        }
    }
}

impl fmt::Display for VotePolarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VotePolarity {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" | "Like" => Ok(VotePolarity::Like),
            "dislike" | "Dislike" => Ok(VotePolarity::Dislike),
            _ => Err(format!("Unknown VotePolarity: {}", s)),
        }
    }
}

/// A ledger entry. At most one exists per (user_id, review_id).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vote {
    pub id: Uuid,
    pub user_id: Uuid,
    pub review_id: Uuid,
    pub polarity: VotePolarity,
    /// Set once the vote has been counted on the review.
    pub applied: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVote {
    pub id: Uuid,
    pub user_id: Uuid,
    pub review_id: Uuid,
    pub polarity: VotePolarity,
    pub created_at: DateTime<Utc>,
}

impl NewVote {
    pub fn new(user_id: Uuid, review_id: Uuid, polarity: VotePolarity) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            review_id,
            polarity,
            created_at: Utc::now(),
        }
    }
}

// Vote request
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub polarity: VotePolarity,
}

// Vote response
#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub likes: i32,
    pub dislikes: i32,
    pub polarity: VotePolarity,
}
