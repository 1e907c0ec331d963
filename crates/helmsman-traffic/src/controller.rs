//! Weighted traffic controller.
//!
//! Reads and writes the stable/canary weights of each stack and applies
//! shifts in the order that never drains both slots at once: the slot
//! gaining traffic is written before the slot losing it. The two writes
//! are not atomic; a crash in between leaves a pair summing to more than
//! 100 until state correction completes it.

use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::{debug, info};

use helmsman_core::{Domain, Route, Scope, Slot, StackIndex, resolve_domain};

use crate::client::DnsRecordClient;
use crate::error::{TrafficError, TrafficResult};
use crate::weights::{FlatWeights, NestedWeights, WeightId, WeightPair, expand};

/// Which way a shift moved traffic, and therefore which slot was written
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftDirection {
    /// Canary grew: canary written first, then stable.
    Forward,
    /// Canary shrank: stable written first, then canary.
    Rollback,
    /// Both records already held the requested weights.
    Unchanged,
}

/// Drives weighted DNS records for the configured routes.
pub struct TrafficController {
    client: Arc<dyn DnsRecordClient>,
    domains: Vec<Domain>,
}

impl TrafficController {
    pub fn new(client: Arc<dyn DnsRecordClient>, domains: Vec<Domain>) -> Self {
        Self { client, domains }
    }

    fn zone_for(&self, route: &Route) -> TrafficResult<&str> {
        resolve_domain(&self.domains, &route.fqdn)
            .map(|d| d.dns_zone_id.as_str())
            .map_err(|_| TrafficError::DomainNotFound {
                route: route.fqdn.clone(),
            })
    }

    /// Weight of one record; a missing record reads as 0.
    pub async fn get_weight(&self, route: &Route, stack: StackIndex, slot: Slot) -> TrafficResult<u8> {
        let zone = self.zone_for(route)?;
        let identifier = WeightId::new(stack, route.scope, slot).to_string();
        let record = self
            .client
            .get(zone, &route.fqdn, &identifier)
            .await
            .map_err(|source| TrafficError::Dns {
                action: "read",
                route: route.fqdn.clone(),
                identifier: identifier.clone(),
                source,
            })?;
        match record {
            Some(r) => Ok(r.weight),
            None => {
                debug!(route = %route.fqdn, %identifier, "no record, reading weight 0");
                Ok(0)
            }
        }
    }

    /// Weights of both slots of `stack` on every route, keyed by identifier.
    ///
    /// Expects at most one route per scope, so identifiers do not collide.
    pub async fn get_weights(&self, routes: &[Route], stack: StackIndex) -> TrafficResult<FlatWeights> {
        let mut weights = FlatWeights::new();
        for route in routes {
            for slot in Slot::ALL {
                let weight = self.get_weight(route, stack, slot).await?;
                weights.insert(WeightId::new(stack, route.scope, slot).to_string(), weight);
            }
        }
        Ok(weights)
    }

    /// Weights of both stacks, grouped by stack, scope and slot.
    pub async fn get_all_weights(&self, routes: &[Route]) -> TrafficResult<NestedWeights> {
        let mut flat = FlatWeights::new();
        for stack in StackIndex::ALL {
            flat.extend(self.get_weights(routes, stack).await?);
        }
        expand(&flat)
    }

    /// Stable/canary weights of `stack` on one route.
    pub async fn get_pair(&self, route: &Route, stack: StackIndex) -> TrafficResult<WeightPair> {
        Ok(WeightPair {
            stable: self.get_weight(route, stack, Slot::Stable).await?,
            canary: self.get_weight(route, stack, Slot::Canary).await?,
        })
    }

    /// Write one absolute weight. Does not touch the sibling slot.
    pub async fn set_weight(
        &self,
        route: &Route,
        stack: StackIndex,
        slot: Slot,
        weight: u8,
    ) -> TrafficResult<()> {
        let identifier = WeightId::new(stack, route.scope, slot).to_string();
        if weight > 100 {
            return Err(TrafficError::WeightOutOfRange {
                route: route.fqdn.clone(),
                identifier,
                weight,
            });
        }
        let zone = self.zone_for(route)?;
        self.client
            .set(zone, &route.fqdn, &identifier, weight)
            .await
            .map_err(|source| TrafficError::Dns {
                action: "write",
                route: route.fqdn.clone(),
                identifier: identifier.clone(),
                source,
            })?;
        info!(route = %route.fqdn, %identifier, weight, "weight set");
        Ok(())
    }

    /// Move `stack`'s canary weight on `route` to `canary_percent`, with
    /// the stable slot taking the rest.
    ///
    /// Growing the canary writes canary then stable; shrinking it writes
    /// stable then canary. Each call is safe to repeat.
    pub async fn shift_traffic(
        &self,
        route: &Route,
        stack: StackIndex,
        canary_percent: u8,
    ) -> TrafficResult<ShiftDirection> {
        if canary_percent > 100 {
            return Err(TrafficError::WeightOutOfRange {
                route: route.fqdn.clone(),
                identifier: WeightId::new(stack, route.scope, Slot::Canary).to_string(),
                weight: canary_percent,
            });
        }
        let current = self.get_pair(route, stack).await?;
        let target = WeightPair {
            stable: 100 - canary_percent,
            canary: canary_percent,
        };
        if current == target {
            debug!(route = %route.fqdn, %stack, canary_percent, "weights already in place");
            return Ok(ShiftDirection::Unchanged);
        }

        let (direction, order) = if canary_percent >= current.canary {
            (ShiftDirection::Forward, [Slot::Canary, Slot::Stable])
        } else {
            (ShiftDirection::Rollback, [Slot::Stable, Slot::Canary])
        };
        for slot in order {
            self.set_weight(route, stack, slot, target.get(slot)).await?;
        }
        info!(
            route = %route.fqdn,
            %stack,
            scope = %route.scope,
            canary_percent,
            ?direction,
            "traffic shifted"
        );
        Ok(direction)
    }

    /// Apply the same shift on every route. Routes are independent and
    /// shifted concurrently; the two writes within a route stay ordered.
    pub async fn shift_routes(
        &self,
        routes: &[Route],
        stack: StackIndex,
        canary_percent: u8,
    ) -> TrafficResult<()> {
        try_join_all(
            routes
                .iter()
                .map(|route| self.shift_traffic(route, stack, canary_percent)),
        )
        .await?;
        Ok(())
    }

    /// Drain `stack`'s canary on every route where it holds records,
    /// leaving stable 100 / canary 0. Never-assigned pairs stay absent.
    pub async fn retire_stack(&self, routes: &[Route], stack: StackIndex) -> TrafficResult<()> {
        try_join_all(routes.iter().map(|route| self.retire_route(route, stack))).await?;
        Ok(())
    }

    async fn retire_route(&self, route: &Route, stack: StackIndex) -> TrafficResult<ShiftDirection> {
        if self.get_pair(route, stack).await?.is_unassigned() {
            debug!(route = %route.fqdn, %stack, "stack never assigned, nothing to retire");
            return Ok(ShiftDirection::Unchanged);
        }
        self.shift_traffic(route, stack, 0).await
    }

    /// Stacks whose canary carries all traffic on the route used to
    /// decide which stack is live: external if configured, else internal.
    pub async fn live_stacks(&self, routes: &[Route]) -> TrafficResult<Vec<StackIndex>> {
        let Some(route) = Self::route_for(routes, Scope::External)
            .or_else(|| Self::route_for(routes, Scope::Internal))
        else {
            return Ok(Vec::new());
        };
        let mut live = Vec::new();
        for stack in StackIndex::ALL {
            if self.get_weight(route, stack, Slot::Canary).await? == 100 {
                live.push(stack);
            }
        }
        Ok(live)
    }

    /// Zero both slots of `stack` on every route (teardown). The canary is
    /// drained first so the stable slot is the last to go.
    pub async fn clear_stack(&self, routes: &[Route], stack: StackIndex) -> TrafficResult<()> {
        for route in routes {
            self.set_weight(route, stack, Slot::Canary, 0).await?;
            self.set_weight(route, stack, Slot::Stable, 0).await?;
        }
        Ok(())
    }

    /// The route of a given scope, if one is configured.
    pub fn route_for(routes: &[Route], scope: Scope) -> Option<&Route> {
        routes.iter().find(|r| r.scope == scope)
    }
}
