//! Sorted resource catalogues and the running-node view.

use crate::backend::ComputeApi;
use crate::error::OpenstackError;
use crate::model::{Flavor, Image, Named, Network, Server};
use crate::ownership::is_occupied;
use crate::session::Openstack;

/// Sorts by name using ordinal (byte-wise) comparison.
///
/// The sort is stable: equal names keep the provider's order.
#[must_use]
pub fn sort_by_name<T: Named>(mut items: Vec<T>) -> Vec<T> {
    items.sort_by(|lhs, rhs| lhs.name().cmp(rhs.name()));
    items
}

impl<A: ComputeApi> Openstack<A> {
    /// Networks sorted by name.
    ///
    /// # Errors
    ///
    /// Propagates provider failures unchanged.
    pub async fn get_sorted_networks(&self) -> Result<Vec<Network>, OpenstackError> {
        Ok(sort_by_name(self.api.list_networks().await?))
    }

    /// Images sorted by name.
    ///
    /// # Errors
    ///
    /// Propagates provider failures unchanged.
    pub async fn get_sorted_images(&self) -> Result<Vec<Image>, OpenstackError> {
        Ok(sort_by_name(self.api.list_images().await?))
    }

    /// Flavors sorted by name.
    ///
    /// # Errors
    ///
    /// Propagates provider failures unchanged.
    pub async fn get_sorted_flavors(&self) -> Result<Vec<Flavor>, OpenstackError> {
        Ok(sort_by_name(self.api.list_flavors().await?))
    }

    /// Servers that are both occupied and ours, in no particular order.
    ///
    /// # Errors
    ///
    /// Propagates provider failures unchanged.
    pub async fn get_running_nodes(&self) -> Result<Vec<Server>, OpenstackError> {
        let servers = self.api.list_servers().await?;
        Ok(servers
            .into_iter()
            .filter(|server| is_occupied(server) && self.fingerprint.is_ours(server))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flavor(id: &str, name: &str) -> Flavor {
        Flavor {
            id: id.to_owned(),
            name: name.to_owned(),
            vcpus: 1,
            ram_mb: 512,
            disk_gb: 10,
        }
    }

    fn names(flavors: &[Flavor]) -> Vec<&str> {
        flavors.iter().map(|item| item.name.as_str()).collect()
    }

    #[test]
    fn sorts_ordinally_not_by_locale() {
        let sorted = sort_by_name(vec![
            flavor("1", "m1.small"),
            flavor("2", "M1.large"),
            flavor("3", "c1.xlarge"),
            flavor("4", "_default"),
        ]);
        assert_eq!(names(&sorted), ["M1.large", "_default", "c1.xlarge", "m1.small"]);
    }

    #[test]
    fn equal_names_keep_provider_order() {
        let sorted = sort_by_name(vec![flavor("b", "same"), flavor("a", "same")]);
        let ids: Vec<&str> = sorted.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn sorted_and_empty_input_is_unchanged() {
        let input = vec![flavor("1", "a"), flavor("2", "b"), flavor("3", "c")];
        assert_eq!(sort_by_name(input.clone()), input);
        assert!(sort_by_name(Vec::<Flavor>::new()).is_empty());
    }
}
