//! Equal-split expense settlement.
//!
//! Balances are recomputed from a snapshot of members and expenses on every
//! call. Transfers come from a greedy two-pointer walk over debtors and
//! creditors in member order; this keeps the transfer count low but is not
//! guaranteed to be the minimum.

use crate::types::{Expense, GroupMember, MemberId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Balances within this many currency units of zero count as settled.
pub const SETTLE_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberBalance {
    pub member_id: MemberId,
    pub name: String,
    pub paid: f64,
    pub balance: f64,
}

/// A debtor or creditor with the magnitude of what they owe or are owed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub member_id: MemberId,
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: MemberId,
    pub from_name: String,
    pub to: MemberId,
    pub to_name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub total: f64,
    pub share: f64,
    pub balances: Vec<MemberBalance>,
    pub debtors: Vec<Party>,
    pub creditors: Vec<Party>,
    pub transactions: Vec<Transfer>,
}

impl Settlement {
    pub fn is_settled(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Compute balances and settling transfers for one trip.
///
/// Expenses without a payer count toward the total but toward nobody's
/// paid amount.
pub fn settle(members: &[GroupMember], expenses: &[Expense]) -> Settlement {
    let total: f64 = expenses.iter().map(|e| e.amount.as_f64()).sum();
    let share = if members.is_empty() {
        0.0
    } else {
        total / members.len() as f64
    };

    let mut paid: HashMap<MemberId, f64> = HashMap::new();
    for expense in expenses {
        if let Some(payer) = expense.payer {
            *paid.entry(payer).or_default() += expense.amount.as_f64();
        }
    }

    let balances: Vec<MemberBalance> = members
        .iter()
        .map(|m| {
            let paid = paid.get(&m.id).copied().unwrap_or(0.0);
            MemberBalance {
                member_id: m.id,
                name: m.name.clone(),
                paid,
                balance: paid - share,
            }
        })
        .collect();

    let debtors: Vec<Party> = balances
        .iter()
        .filter(|b| b.balance < -SETTLE_EPSILON)
        .map(|b| Party { member_id: b.member_id, name: b.name.clone(), amount: -b.balance })
        .collect();
    let creditors: Vec<Party> = balances
        .iter()
        .filter(|b| b.balance > SETTLE_EPSILON)
        .map(|b| Party { member_id: b.member_id, name: b.name.clone(), amount: b.balance })
        .collect();

    let transactions = greedy_transfers(&debtors, &creditors);

    tracing::debug!(
        members = members.len(),
        expenses = expenses.len(),
        total,
        share,
        transfers = transactions.len(),
        "settlement computed"
    );

    Settlement {
        total,
        share,
        balances,
        debtors,
        creditors,
        transactions,
    }
}

fn greedy_transfers(debtors: &[Party], creditors: &[Party]) -> Vec<Transfer> {
    let mut owed: Vec<f64> = debtors.iter().map(|d| d.amount).collect();
    let mut due: Vec<f64> = creditors.iter().map(|c| c.amount).collect();
    let mut transfers = Vec::new();

    let (mut i, mut j) = (0, 0);
    while i < debtors.len() && j < creditors.len() {
        let amount = owed[i].min(due[j]);
        if amount > SETTLE_EPSILON {
            transfers.push(Transfer {
                from: debtors[i].member_id,
                from_name: debtors[i].name.clone(),
                to: creditors[j].member_id,
                to_name: creditors[j].name.clone(),
                amount: round_cents(amount),
            });
        }

        owed[i] -= amount;
        due[j] -= amount;
        if owed[i] <= SETTLE_EPSILON {
            i += 1;
        }
        if due[j] <= SETTLE_EPSILON {
            j += 1;
        }
    }

    transfers
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
