use time::OffsetDateTime;
use tns_core::models::MarketState;
use tns_core::ports::AuditEvent;
use tracing::{Level, event, span};

use super::{Market, MarketContext};

impl Market {
    /// The time at which the market may enter `state`
    pub fn start_of(&self, state: MarketState) -> OffsetDateTime {
        let clearing = self.key.clearing_time;
        let config = &self.config;
        match state {
            MarketState::Inactive | MarketState::Active => clearing - config.activation_offset(),
            MarketState::Negotiation => clearing - config.negotiation_offset(),
            MarketState::MarketLead => clearing - config.market_lead_time,
            MarketState::DeliveryLead => clearing,
            MarketState::Delivery => clearing + config.delivery_lead_time,
            MarketState::Reconcile | MarketState::Expired => {
                clearing + config.delivery_end_offset()
            }
        }
    }

    /// Advance the market.
    ///
    /// The work of the current state is done first. If that work is complete and the
    /// next state's start time has arrived, the market enters the next state and
    /// performs its entry action. Returns the state entered, if any.
    pub fn tick(
        &mut self,
        now: OffsetDateTime,
        ctx: &mut MarketContext<'_>,
    ) -> Option<MarketState> {
        let span = span!(Level::DEBUG, "market", market = %self.key);
        let _guard = span.enter();

        let complete = match self.state {
            MarketState::Inactive => true,
            MarketState::Active => self.while_active(ctx),
            MarketState::Negotiation => self.while_negotiating(now, ctx),
            MarketState::MarketLead => self.while_in_market_lead(ctx),
            MarketState::DeliveryLead | MarketState::Delivery => true,
            MarketState::Reconcile => self.reconciled,
            MarketState::Expired => false,
        };

        let next = self.state.next()?;
        if !complete || now < self.start_of(next) {
            return None;
        }

        let from = std::mem::replace(&mut self.state, next);
        self.on_enter(ctx);
        event!(Level::INFO, from = %from, to = %next, "market state changed");
        ctx.audit.publish(AuditEvent::StateChanged {
            market: self.key.clone(),
            from,
            to: next,
        });
        Some(next)
    }

    fn on_enter(&mut self, ctx: &mut MarketContext<'_>) {
        match self.state {
            MarketState::Active => {
                self.check_intervals();
                self.check_marginal_prices(ctx.prices);
            }
            MarketState::Delivery => self.update_price_model(),
            MarketState::Reconcile => self.reconciled = self.config.auto_reconcile,
            MarketState::Expired => self.release(ctx),
            _ => {}
        }
    }

    // Prices of the prior or refined market may only appear after activation
    fn while_active(&mut self, ctx: &mut MarketContext<'_>) -> bool {
        self.check_marginal_prices(ctx.prices);
        true
    }

    // The negotiation window closes at the clearing time whether or not it converged
    fn while_negotiating(&mut self, now: OffsetDateTime, ctx: &mut MarketContext<'_>) -> bool {
        self.clear_intervals(ctx);
        let converged = self.negotiate(now, ctx);
        if !converged && now >= self.key.clearing_time {
            event!(Level::WARN, "negotiation closed without convergence");
            return true;
        }
        converged
    }

    fn while_in_market_lead(&mut self, ctx: &mut MarketContext<'_>) -> bool {
        let cleared = self.clear_intervals(ctx);
        self.converged = cleared;
        true
    }
}
