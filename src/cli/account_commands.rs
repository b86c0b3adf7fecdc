// Account management commands

use gemini_cryptotrader::{Account, AccountUpdate, Session, TraderResult};
use tracing::info;

use crate::AccountCommands;

pub fn handle(cmd: AccountCommands, session: &Session) -> TraderResult<()> {
    match cmd {
        AccountCommands::Add {
            account_id,
            api_key,
            secret_key,
            trader,
            heartbeat,
            fund_manager,
            sandbox,
        } => {
            let account = Account::new(&account_id, &api_key, &secret_key)
                .with_roles(trader, fund_manager)
                .with_heartbeat(heartbeat)
                .sandbox(sandbox);

            session.with_store_mut(|store| store.add(account).map(|_| ()))?;
            info!("✅ Added account '{}'", account_id);
            Ok(())
        }

        AccountCommands::Update {
            account_id,
            api_key,
            secret_key,
            trader,
            heartbeat,
            fund_manager,
            sandbox,
        } => {
            let fields = AccountUpdate {
                api_key,
                secret_key,
                is_trader: trader,
                has_heartbeat: heartbeat,
                is_fund_manager: fund_manager,
                is_sandbox: sandbox,
            };

            session.with_store_mut(|store| store.update(&account_id, &fields).map(|_| ()))?;
            info!("✅ Updated account '{}'", account_id);
            Ok(())
        }

        AccountCommands::Remove { account_id } => {
            session.with_store_mut(|store| store.remove(&account_id).map(|_| ()))?;
            info!("🗑️  Removed account '{}'", account_id);
            Ok(())
        }

        AccountCommands::Use { account_id } => {
            let placeholder = session.with_store_mut(|store| {
                store.set_last_used(&account_id).map(Account::is_placeholder)
            })?;
            if placeholder {
                info!("No accounts configured (add one with: gemini-trader account add)");
            } else {
                info!("👤 Now using account '{}'", account_id);
            }
            Ok(())
        }

        AccountCommands::List => {
            list_accounts(session);
            Ok(())
        }
    }
}

fn list_accounts(session: &Session) {
    let store = session.store();

    if store.is_empty() {
        info!("No accounts configured (add one with: gemini-trader account add)");
        return;
    }

    info!("👤 Accounts");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for account in store.accounts() {
        let mut roles = Vec::new();
        if account.is_trader {
            roles.push("trader");
        }
        if account.has_heartbeat {
            roles.push("heartbeat");
        }
        if account.is_fund_manager {
            roles.push("fund manager");
        }

        info!(
            "{} {:<20} {:<30} {}",
            if account.last_used { "▶" } else { " " },
            account.account_id,
            roles.join(", "),
            if account.is_sandbox { "sandbox" } else { "production" }
        );
    }
}
