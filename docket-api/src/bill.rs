use std::{fmt, str::FromStr};

use crate::{Error, Time, UserId};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct BillId(pub i64);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: BillId,
    /// Display number assigned by the legislature, eg. `H.R. 815`
    pub bill_number: String,
    pub title: String,
    pub summary: String,
    /// Date of introduction
    pub date: Time,
    pub link: Option<String>,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBill {
    pub bill_number: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub date: Time,
    pub link: Option<String>,
}

impl NewBill {
    pub fn validate(&self) -> Result<(), Error> {
        if self.bill_number.trim().is_empty() {
            return Err(Error::Validation(String::from("billNumber is required")));
        }
        if self.title.trim().is_empty() {
            return Err(Error::Validation(String::from("title is required")));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum BillVoteType {
    For,
    Against,
    Abstain,
}

impl BillVoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillVoteType::For => "For",
            BillVoteType::Against => "Against",
            BillVoteType::Abstain => "Abstain",
        }
    }
}

impl fmt::Display for BillVoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillVoteType {
    type Err = Error;

    fn from_str(s: &str) -> Result<BillVoteType, Error> {
        match s {
            "For" => Ok(BillVoteType::For),
            "Against" => Ok(BillVoteType::Against),
            "Abstain" => Ok(BillVoteType::Abstain),
            _ => Err(Error::Validation(String::from("Invalid voteType"))),
        }
    }
}

#[derive(Clone, Copy, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBillVote {
    pub bill_id: BillId,
    pub vote_type: BillVoteType,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillVote {
    pub id: i64,
    pub bill_id: BillId,
    pub user_id: Option<UserId>,
    pub vote_type: BillVoteType,
}

/// Public vote counts on a bill
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillVoteTally {
    pub bill_id: BillId,
    #[serde(rename = "for")]
    pub votes_for: i64,
    #[serde(rename = "against")]
    pub votes_against: i64,
    #[serde(rename = "abstain")]
    pub votes_abstain: i64,
}

impl BillVoteTally {
    pub fn empty(bill_id: BillId) -> BillVoteTally {
        BillVoteTally {
            bill_id,
            votes_for: 0,
            votes_against: 0,
            votes_abstain: 0,
        }
    }

    pub fn add(&mut self, vote_type: BillVoteType, count: i64) {
        match vote_type {
            BillVoteType::For => self.votes_for += count,
            BillVoteType::Against => self.votes_against += count,
            BillVoteType::Abstain => self.votes_abstain += count,
        }
    }

    pub fn total(&self) -> i64 {
        self.votes_for + self.votes_against + self.votes_abstain
    }
}
