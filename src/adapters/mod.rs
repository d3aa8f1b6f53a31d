pub mod alipay;
pub mod stripe;
pub mod wechatpay;

use {
    crate::config::Settings,
    crate::domain::error::GatewayError,
    crate::domain::provider::{Provider, ProviderAdapter},
    std::collections::HashMap,
    std::sync::Arc,
};

/// Adapters constructed once at startup from configuration, looked up by
/// provider tag at call sites. Providers without configuration are absent.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn from_settings(settings: &Settings) -> Result<Self, GatewayError> {
        let mut registry = Self::default();

        if let Some(cfg) = &settings.stripe {
            registry.register(Arc::new(stripe::StripeAdapter::new(cfg)));
        }
        if let Some(cfg) = &settings.alipay {
            registry.register(Arc::new(alipay::AlipayAdapter::new(cfg)?));
        }
        if let Some(cfg) = &settings.wechatpay {
            registry.register(Arc::new(wechatpay::WechatPayAdapter::new(cfg)?));
        }

        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: Provider) -> Result<&dyn ProviderAdapter, GatewayError> {
        self.adapters
            .get(&provider)
            .map(Arc::as_ref)
            .ok_or_else(|| {
                GatewayError::ServiceUnavailable(format!("provider not configured: {provider}"))
            })
    }

    pub fn configured(&self) -> impl Iterator<Item = Provider> + '_ {
        self.adapters.keys().copied()
    }
}
