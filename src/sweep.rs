//! Sweep assembly: full-balance token transfers plus a fractional native
//! transfer, serialized unsigned for the wallet's signer.

use serde::Serialize;
use solana_sdk::{ instruction::Instruction, pubkey::Pubkey, system_instruction, transaction::Transaction };
use spl_associated_token_account::get_associated_token_address_with_program_id;
use spl_associated_token_account::instruction::create_associated_token_account;

use crate::config::SweepConfig;
use crate::errors::{ SweepError, SweepResult };
use crate::logger::{ log, LogTag };
use crate::rpc::{ lamports_to_sol, LedgerRpc, TokenAccountInfo };
use crate::snapshot::{ fetch_account_snapshot, AccountSnapshot };
use crate::utils::truncate_address;

/// One token movement included in a plan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    pub mint: String,
    pub amount: u64,
    pub decimals: u8,
}

/// An assembled, not-yet-signed sweep. Immutable once built; retries re-sign
/// this same serialized transaction.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub transaction: Vec<u8>,
    pub transfer_amount: u64,
    pub token_transfers: Vec<TokenTransfer>,
    pub created_accounts: usize,
    pub estimated_fees: u64,
}

/// Fee estimate for a sweep carrying `token_transfer_count` token movements:
/// base fee, one instruction fee per transfer plus the native transfer, and
/// one account creation reserve per transfer.
pub fn estimate_fees(token_transfer_count: usize, config: &SweepConfig) -> u64 {
    let transfers = token_transfer_count as u64;
    config.base_fee +
        (transfers + 1) * config.per_instruction_fee +
        transfers * config.account_creation_fee
}

/// Native amount to move: floor((balance - rent reserve - fees) * fraction),
/// clamped at zero so an underfunded wallet never produces a negative amount.
pub fn native_transfer_amount(
    balance: u64,
    rent_reserve: u64,
    estimated_fees: u64,
    fraction: f64
) -> u64 {
    let available = (balance as i128) - (rent_reserve as i128) - (estimated_fees as i128);
    if available <= 0 {
        return 0;
    }
    ((available as f64) * fraction).floor() as u64
}

/// Assemble the unsigned sweep for `owner`, moving every positive token
/// holding and the fractional native remainder to `destination`.
pub async fn prepare_sweep(
    rpc: &dyn LedgerRpc,
    owner: &Pubkey,
    destination: &Pubkey,
    config: &SweepConfig
) -> SweepResult<SweepPlan> {
    let snapshot = fetch_account_snapshot(rpc, owner).await?;
    prepare_sweep_from_snapshot(rpc, &snapshot, destination, config).await
}

/// Same as [`prepare_sweep`] for a snapshot already in hand.
pub async fn prepare_sweep_from_snapshot(
    rpc: &dyn LedgerRpc,
    snapshot: &AccountSnapshot,
    destination: &Pubkey,
    config: &SweepConfig
) -> SweepResult<SweepPlan> {
    let owner = &snapshot.address;

    if snapshot.lamports < config.min_native_balance_lamports {
        return Err(SweepError::InsufficientBalance {
            balance_sol: lamports_to_sol(snapshot.lamports),
            required_sol: lamports_to_sol(config.min_native_balance_lamports),
        });
    }

    let holdings: Vec<&TokenAccountInfo> = snapshot.positive_holdings().collect();

    // Destination token accounts, checked in one batched query.
    let destination_atas: Vec<Pubkey> = holdings
        .iter()
        .map(|h| {
            get_associated_token_address_with_program_id(
                destination,
                &h.mint,
                &token_program_id(h.is_token_2022)
            )
        })
        .collect();
    let existing = rpc.get_accounts_exist(&destination_atas).await?;
    if existing.len() != destination_atas.len() {
        return Err(
            SweepError::Rpc("account existence response length mismatch".to_string())
        );
    }

    let mut instructions: Vec<Instruction> = Vec::new();
    let mut token_transfers = Vec::new();
    let mut created_accounts = 0;

    for (i, holding) in holdings.iter().enumerate() {
        let program_id = token_program_id(holding.is_token_2022);

        if !existing[i] {
            // The swept wallet funds its own destination account creations.
            instructions.push(
                create_associated_token_account(owner, destination, &holding.mint, &program_id)
            );
            created_accounts += 1;
        }

        instructions.push(
            transfer_checked_instruction(holding, &destination_atas[i], owner, &program_id)?
        );
        token_transfers.push(TokenTransfer {
            mint: holding.mint.to_string(),
            amount: holding.amount,
            decimals: holding.decimals,
        });
    }

    let rent_reserve = rpc.get_minimum_balance_for_rent_exemption(0).await?;
    let estimated_fees = estimate_fees(token_transfers.len(), config);
    let transfer_amount = native_transfer_amount(
        snapshot.lamports,
        rent_reserve,
        estimated_fees,
        config.transfer_fraction
    );

    if transfer_amount > 0 {
        instructions.push(system_instruction::transfer(owner, destination, transfer_amount));
    }

    if instructions.is_empty() {
        return Err(SweepError::InsufficientBalance {
            balance_sol: snapshot.sol_balance(),
            required_sol: lamports_to_sol(rent_reserve + estimated_fees),
        });
    }

    let blockhash = rpc.get_latest_blockhash().await?;
    let mut transaction = Transaction::new_with_payer(&instructions, Some(owner));
    transaction.message.recent_blockhash = blockhash;
    let bytes = bincode::serialize(&transaction)?;

    log(
        LogTag::Sweep,
        "PLAN",
        &format!(
            "Plan for {}: {} token transfers, {} account creations, {:.9} SOL native, est. fees {} lamports",
            truncate_address(&owner.to_string()),
            token_transfers.len(),
            created_accounts,
            lamports_to_sol(transfer_amount),
            estimated_fees
        )
    );

    Ok(SweepPlan {
        transaction: bytes,
        transfer_amount,
        token_transfers,
        created_accounts,
        estimated_fees,
    })
}

fn token_program_id(is_token_2022: bool) -> Pubkey {
    if is_token_2022 {
        spl_token_2022::id()
    } else {
        spl_token::id()
    }
}

/// Checked transfer so the on-chain program validates mint and decimals.
fn transfer_checked_instruction(
    holding: &TokenAccountInfo,
    destination_ata: &Pubkey,
    owner: &Pubkey,
    program_id: &Pubkey
) -> SweepResult<Instruction> {
    let instruction = if holding.is_token_2022 {
        spl_token_2022::instruction::transfer_checked(
            program_id,
            &holding.account,
            &holding.mint,
            destination_ata,
            owner,
            &[],
            holding.amount,
            holding.decimals
        )
    } else {
        spl_token::instruction::transfer_checked(
            program_id,
            &holding.account,
            &holding.mint,
            destination_ata,
            owner,
            &[],
            holding.amount,
            holding.decimals
        )
    };

    instruction.map_err(|e| SweepError::TransactionFailed(format!("token transfer instruction: {}", e)))
}
