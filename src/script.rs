// ============================================================================
// Script Verification Policy
// ============================================================================
//
// Accounts and assets may carry scripts that gate what the matcher will
// accept. The script language itself is not evaluated here: an injected
// ScriptRunner capability takes the chain height, the subject under
// judgment and the script, and answers allow/deny or an execution error.
//
// Without an account script, the policy is plain signature verification:
// exactly one proof that is a valid ed25519 signature over the subject's
// canonical body bytes. An emitted exchange transaction must satisfy the
// matcher, buyer and seller account policies plus the script of every
// scripted asset in the pair.
//
// ============================================================================

use crate::account::Address;
use crate::errors::MatcherError;
use crate::node::BlockchainView;
use crate::order::Order;
use crate::transaction::ExchangeTransaction;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Feature id gating whether scripted accounts may trade at all.
pub const SMART_ACCOUNT_TRADING_FEATURE: u16 = 10;

pub const SCRIPTED_ACCOUNT_TRADING_DENIED: &str =
    "Trading on scripted account isn't allowed yet.";

/// Opaque script source, evaluated by the injected runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub text: String,
}

#[derive(Debug, Clone, Copy)]
pub enum ScriptSubject<'a> {
    Order(&'a Order),
    Transaction(&'a ExchangeTransaction),
}

impl ScriptSubject<'_> {
    fn describe(&self) -> String {
        match self {
            ScriptSubject::Order(order) => format!("order {}", order.id()),
            ScriptSubject::Transaction(tx) => format!("transaction {}", tx.id_base58()),
        }
    }
}

/// Evaluator capability. Implementations decide the script language.
pub trait ScriptRunner: Send + Sync {
    fn run(
        &self,
        height: u64,
        subject: ScriptSubject<'_>,
        script: &Script,
    ) -> Result<bool, String>;
}

pub struct ScriptVerifier {
    blockchain: Arc<dyn BlockchainView>,
    runner: Arc<dyn ScriptRunner>,
}

impl ScriptVerifier {
    pub fn new(blockchain: Arc<dyn BlockchainView>, runner: Arc<dyn ScriptRunner>) -> Self {
        ScriptVerifier { blockchain, runner }
    }

    fn smart_account_trading_allowed(&self) -> bool {
        match self
            .blockchain
            .activation_height(SMART_ACCOUNT_TRADING_FEATURE)
        {
            Some(height) => self.blockchain.height() >= height,
            None => false,
        }
    }

    /// Placement-time proof check for one order.
    pub fn verify_order(&self, order: &Order) -> Result<(), MatcherError> {
        let sender = order.sender_public_key.address();
        match self.blockchain.account_script(&sender) {
            None => {
                if verified_by_signature(order) {
                    Ok(())
                } else {
                    Err(MatcherError::ValidationFailure(
                        "signature should be valid".to_string(),
                    ))
                }
            }
            Some(script) => {
                if !self.smart_account_trading_allowed() {
                    return Err(MatcherError::ValidationFailure(
                        SCRIPTED_ACCOUNT_TRADING_DENIED.to_string(),
                    ));
                }
                self.run_account_script(&script, ScriptSubject::Order(order))
            }
        }
    }

    /// Pre-broadcast policy for an emitted exchange transaction: matcher,
    /// buyer and seller account policies plus every scripted asset.
    pub fn verify_transaction(
        &self,
        matcher: &Address,
        tx: &ExchangeTransaction,
    ) -> Result<(), MatcherError> {
        let subject = ScriptSubject::Transaction(tx);
        let buyer = tx.buy_order.sender_public_key.address();
        let seller = tx.sell_order.sender_public_key.address();
        for account in [matcher, &buyer, &seller] {
            if let Some(script) = self.blockchain.account_script(account) {
                self.run_account_script(&script, subject)?;
            }
        }
        let pair = &tx.buy_order.asset_pair;
        for asset in [&pair.amount_asset, &pair.price_asset] {
            if let Some(id) = asset {
                if let Some(script) = self.blockchain.asset_script(id) {
                    self.run_script(&script, subject, true)?;
                }
            }
        }
        Ok(())
    }

    fn run_account_script(
        &self,
        script: &Script,
        subject: ScriptSubject<'_>,
    ) -> Result<(), MatcherError> {
        self.run_script(script, subject, false)
    }

    fn run_script(
        &self,
        script: &Script,
        subject: ScriptSubject<'_>,
        is_asset_script: bool,
    ) -> Result<(), MatcherError> {
        match self.runner.run(self.blockchain.height(), subject, script) {
            Ok(true) => Ok(()),
            Ok(false) => Err(MatcherError::ScriptRejected {
                context: subject.describe(),
                script_text: script.text.clone(),
                is_asset_script,
            }),
            Err(error) => Err(MatcherError::ScriptExecutionError {
                context: subject.describe(),
                error,
                script_text: script.text.clone(),
                is_asset_script,
            }),
        }
    }
}

/// The scriptless policy: exactly one proof, verifying as an ed25519
/// signature over the order's body bytes.
pub fn verified_by_signature(order: &Order) -> bool {
    match order.proofs.as_slice() {
        [proof] => order
            .sender_public_key
            .verify(&order.body_bytes(), &proof.0),
        _ => false,
    }
}

// ============================================================================
// TESTS
// ============================================================================
