use {crate::domain::error::GatewayError, std::str::FromStr, std::time::Duration};

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, GatewayError> {
    match env_opt(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| GatewayError::Validation(format!("invalid value for {key}: {raw}"))),
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub echo: bool,
}

impl DatabaseSettings {
    pub fn url(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }

    pub fn max_connections(&self) -> u32 {
        self.pool_size + self.max_overflow
    }
}

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct AlipaySettings {
    pub app_id: String,
    /// Application private key, PKCS#8 PEM.
    pub private_key: String,
    /// Alipay platform public key, PEM.
    pub public_key: String,
    pub sandbox: bool,
}

#[derive(Debug, Clone)]
pub struct WechatPaySettings {
    pub mchid: String,
    pub appid: String,
    pub api_v3_key: String,
    pub serial_no: String,
    /// Merchant private key, PKCS#8 PEM.
    pub private_key: String,
    /// Platform public key used to verify callback signatures, PEM.
    pub platform_public_key: String,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_retries: i32,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub stripe: Option<StripeSettings>,
    pub alipay: Option<AlipaySettings>,
    pub wechatpay: Option<WechatPaySettings>,
    pub log_level: String,
    pub payment_expire_minutes_default: i64,
    pub worker: WorkerSettings,
}

impl Settings {
    /// Load from environment variables. Provider blocks are optional: a
    /// provider with no configuration is simply absent from the registry.
    pub fn from_env() -> Result<Self, GatewayError> {
        let database = DatabaseSettings {
            host: env_or("DB_HOST", "localhost"),
            port: env_parse("DB_PORT", 5432)?,
            user: env_or("DB_USER", "gateway"),
            password: env_or("DB_PASSWORD", "dev_password"),
            name: env_or("DB_NAME", "gateway"),
            pool_size: env_parse("DB_POOL_SIZE", 5)?,
            max_overflow: env_parse("DB_MAX_OVERFLOW", 10)?,
            echo: env_parse("DB_ECHO", false)?,
        };

        let stripe = match (env_opt("STRIPE_SECRET_KEY"), env_opt("STRIPE_WEBHOOK_SECRET")) {
            (Some(secret_key), Some(webhook_secret)) => Some(StripeSettings {
                secret_key,
                webhook_secret,
            }),
            _ => None,
        };

        let alipay = env_opt("ALIPAY_APP_ID").map(|app_id| {
            Ok::<_, GatewayError>(AlipaySettings {
                app_id,
                private_key: env_or("ALIPAY_PRIVATE_KEY", ""),
                public_key: env_or("ALIPAY_PUBLIC_KEY", ""),
                sandbox: env_parse("ALIPAY_SANDBOX", false)?,
            })
        });
        let alipay = alipay.transpose()?;

        let wechatpay = env_opt("WECHATPAY_MCHID").map(|mchid| WechatPaySettings {
            mchid,
            appid: env_or("WECHATPAY_APPID", ""),
            api_v3_key: env_or("WECHATPAY_API_V3_KEY", ""),
            serial_no: env_or("WECHATPAY_SERIAL_NO", ""),
            private_key: env_or("WECHATPAY_PRIVATE_KEY", ""),
            platform_public_key: env_or("WECHATPAY_PUBLIC_KEY", ""),
        });

        let payment_expire_minutes_default =
            env_parse("PAYMENT_EXPIRE_MINUTES_DEFAULT", 30i64)?.clamp(1, 24 * 60);

        let worker = WorkerSettings {
            poll_interval: Duration::from_secs(env_parse("WORKER_POLL_INTERVAL", 5u64)?),
            batch_size: env_parse("WORKER_BATCH_SIZE", 10)?,
            max_retries: env_parse("WORKER_MAX_RETRIES", 10)?,
        };

        Ok(Self {
            database,
            stripe,
            alipay,
            wechatpay,
            log_level: env_or("LOG_LEVEL", "info"),
            payment_expire_minutes_default,
            worker,
        })
    }
}
