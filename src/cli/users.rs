use anyhow::{bail, Context};
use clap::Subcommand;
use rand::Rng;
use sqlx::PgPool;

use crate::auth::{CredentialHasher, RegisterRequest};
use crate::storage::{CreateUser, PostgresUserStore, StorageError, User, UserStore};

/// User management subcommands
#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a new user
    Create {
        /// User's email address
        #[arg(short, long)]
        email: String,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        /// Role name: admin, doctor, patient or family_member
        #[arg(short, long, default_value = "patient")]
        role: String,

        /// Password (if not provided, a random one will be generated)
        #[arg(short, long)]
        password: Option<String>,

        #[arg(long)]
        phone: Option<String>,
    },

    /// List all users
    List,

    /// Show user details
    Show {
        /// User's email address
        email: String,
    },

    /// Clear the failed-login counter, ending a lockout
    Unlock {
        /// User's email address
        #[arg(short, long)]
        email: String,
    },

    /// Suspend a user (prevent login)
    Suspend {
        /// User's email address
        #[arg(short, long)]
        email: String,
    },

    /// Activate a suspended user
    Activate {
        /// User's email address
        #[arg(short, long)]
        email: String,
    },
}

impl UserCommands {
    /// Execute the user command
    pub async fn execute(self, pool: PgPool) -> anyhow::Result<()> {
        let user_store = PostgresUserStore::new(pool);

        match self {
            UserCommands::Create {
                email,
                first_name,
                last_name,
                role,
                password,
                phone,
            } => {
                let role_id = user_store
                    .role_id(&role)
                    .await
                    .with_context(|| format!("Unknown role '{role}'"))?;
                let generated = password.is_none();
                let password = password.unwrap_or_else(generate_secure_password);

                let request = RegisterRequest {
                    email,
                    password,
                    first_name,
                    last_name,
                    phone_number: phone,
                    role_id,
                };
                request.validate()?;

                let password_hash = CredentialHasher::new()
                    .hash_blocking(request.password.clone())
                    .await
                    .context("Failed to hash password")?;

                let user_id = match user_store
                    .create(CreateUser {
                        email: request.email.clone(),
                        password_hash,
                        role_id,
                        first_name: request.first_name.clone(),
                        last_name: request.last_name.clone(),
                        phone_number: request.phone_number.clone(),
                    })
                    .await
                {
                    Ok(id) => id,
                    Err(StorageError::DuplicateEmail(email)) => {
                        bail!("A user with email {email} already exists")
                    }
                    Err(e) => return Err(e.into()),
                };

                println!("User created.");
                println!();
                println!("   ID:       {}", user_id);
                println!("   Email:    {}", request.email);
                println!("   Name:     {} {}", request.first_name, request.last_name);
                println!("   Role:     {}", role);
                if generated {
                    println!("   Password: {}", request.password);
                    println!();
                    println!("Share the generated password with the user over a secure channel.");
                }
            }

            UserCommands::List => {
                let users = user_store.list().await?;

                if users.is_empty() {
                    println!("No users found.");
                    return Ok(());
                }

                println!(
                    "{:<36} {:<30} {:<14} {:<8} {:<8}",
                    "ID", "Email", "Role", "Active", "Failed"
                );
                println!("{}", "-".repeat(100));

                for user in users {
                    println!(
                        "{:<36} {:<30} {:<14} {:<8} {:<8}",
                        user.id,
                        truncate(&user.email, 28),
                        user.role_name,
                        if user.is_active { "Yes" } else { "No" },
                        user.failed_login_attempts
                    );
                }
            }

            UserCommands::Show { email } => {
                let user = find(&user_store, &email).await?;

                println!("User Details:");
                println!("  ID:           {}", user.id);
                println!("  Email:        {}", user.email);
                println!("  Name:         {} {}", user.first_name, user.last_name);
                println!("  Phone:        {}", user.phone_number.as_deref().unwrap_or("-"));
                println!("  Role:         {}", user.role_name);
                println!("  Active:       {}", if user.is_active { "Yes" } else { "No" });
                println!("  Failed login: {}", user.failed_login_attempts);
                println!("  Created:      {}", user.created_at);
                println!(
                    "  Last Login:   {}",
                    user.last_login
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "Never".to_string())
                );
            }

            UserCommands::Unlock { email } => {
                user_store.reset_failed_logins(&email).await?;
                println!("User {} has been unlocked.", email);
            }

            UserCommands::Suspend { email } => {
                user_store.set_active(&email, false).await?;
                println!("User {} has been suspended.", email);
            }

            UserCommands::Activate { email } => {
                user_store.set_active(&email, true).await?;
                println!("User {} has been activated.", email);
            }
        }

        Ok(())
    }
}

async fn find(store: &PostgresUserStore, email: &str) -> anyhow::Result<User> {
    store
        .find_by_email(email)
        .await?
        .ok_or_else(|| StorageError::UserNotFound(email.to_string()).into())
}

/// Generate a random password from an unambiguous alphabet
fn generate_secure_password() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789!@#$%&*";
    let mut rng = rand::thread_rng();

    (0..16)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Truncate to `max_len` characters with an ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
