//! resource-type catalogue
//!
//! Each supported terraform resource type maps to a [ResourceDescriptor] telling the
//! resolver where to find container references and which [Strategy] applies, and
//! telling the grouping stage whether the type is one facet of an access-control policy.
use std::collections::HashMap;

/// How ancestry is derived for a resource category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Requires an organization reference, the chain is the organization alone
    Organization,
    /// Own folder id, then parent folder or organization
    Folder,
    /// Projects and their billing info: exactly one of organization or folder
    Project,
    /// Organization level if set, otherwise project level
    CustomRole,
    /// Only the project counts (other container-like fields name something else)
    ProjectOnly,
    /// Organization, then folder, then project
    Generic,
}

/// The three facets of one logical access-control object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingFacet {
    /// one grant (`*_iam_member`)
    Member,
    /// all grants of one role (`*_iam_binding`)
    Binding,
    /// the full policy document (`*_iam_policy`)
    Policy,
}

impl BindingFacet {
    const ALL: [BindingFacet; 3] = [BindingFacet::Member, BindingFacet::Binding, BindingFacet::Policy];

    fn suffix(self) -> &'static str {
        match self {
            BindingFacet::Member => "member",
            BindingFacet::Binding => "binding",
            BindingFacet::Policy => "policy",
        }
    }
}

/// Fields that may hold a container reference, tried in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerFields {
    pub organization: &'static [&'static str],
    pub folder: &'static [&'static str],
    pub project: &'static [&'static str],
    /// fields holding a full locator (`folders/1`, ...), routed by prefix
    pub routed: &'static [&'static str],
}

impl ContainerFields {
    pub const DEFAULT: ContainerFields = ContainerFields {
        organization: &["org_id"],
        folder: &["folder"],
        project: &["project"],
        routed: &["parent"],
    };

    const fn organization(fields: &'static [&'static str]) -> Self {
        Self {
            organization: fields,
            ..Self::DEFAULT
        }
    }

    const fn folder(fields: &'static [&'static str]) -> Self {
        Self {
            folder: fields,
            ..Self::DEFAULT
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescriptor {
    pub asset_type: &'static str,
    pub strategy: Strategy,
    pub containers: ContainerFields,
    /// set for policy-binding family members
    pub binding: Option<BindingFacet>,
    /// shared by all facets of one binding family, the resource type otherwise
    pub family: &'static str,
    /// fields naming the asset, used to detect two declarations of one asset
    pub name_fields: &'static [&'static str],
}

impl ResourceDescriptor {
    pub fn is_binding(&self) -> bool {
        self.binding.is_some()
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    descriptors: HashMap<String, ResourceDescriptor>,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, resource_type: &str) -> Option<&ResourceDescriptor> {
        self.descriptors.get(resource_type)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Registers a regular resource type
    pub fn resource(
        &mut self,
        resource_type: &'static str,
        asset_type: &'static str,
        strategy: Strategy,
        containers: ContainerFields,
        name_fields: &'static [&'static str],
    ) -> &mut Self {
        self.descriptors.insert(
            resource_type.to_string(),
            ResourceDescriptor {
                asset_type,
                strategy,
                containers,
                binding: None,
                family: resource_type,
                name_fields,
            },
        );
        self
    }

    /// Registers `<family>_member`, `<family>_binding` and `<family>_policy`
    pub fn binding_family(
        &mut self,
        family: &'static str,
        asset_type: &'static str,
        strategy: Strategy,
        containers: ContainerFields,
    ) -> &mut Self {
        for facet in BindingFacet::ALL {
            self.descriptors.insert(
                format!("{family}_{}", facet.suffix()),
                ResourceDescriptor {
                    asset_type,
                    strategy,
                    containers,
                    binding: Some(facet),
                    family,
                    name_fields: &[],
                },
            );
        }
        self
    }

    /// Catalogue of the supported google provider resources
    pub fn builtin() -> Self {
        use Strategy::*;
        const PROJECT_RESOURCE: ContainerFields = ContainerFields {
            organization: &["org_id"],
            folder: &["folder_id"],
            project: &["number", "project_id"],
            routed: &[],
        };
        const FOLDER_RESOURCE: ContainerFields = ContainerFields {
            organization: &[],
            folder: &["folder_id"],
            project: &[],
            routed: &["parent"],
        };
        const PROJECT_ONLY: ContainerFields = ContainerFields {
            organization: &[],
            folder: &[],
            project: &["project"],
            routed: &[],
        };
        let default = ContainerFields::DEFAULT;

        let mut registry = Self::empty();
        registry
            // resource manager
            .binding_family(
                "google_organization_iam",
                "cloudresourcemanager.googleapis.com/Organization",
                Organization,
                ContainerFields::organization(&["org_id"]),
            )
            .binding_family(
                "google_folder_iam",
                "cloudresourcemanager.googleapis.com/Folder",
                Folder,
                ContainerFields::folder(&["folder"]),
            )
            .binding_family(
                "google_project_iam",
                "cloudresourcemanager.googleapis.com/Project",
                Project,
                ContainerFields {
                    routed: &[],
                    ..default
                },
            )
            .resource(
                "google_project",
                "cloudresourcemanager.googleapis.com/Project",
                Project,
                PROJECT_RESOURCE,
                &["project_id"],
            )
            .resource(
                "google_folder",
                "cloudresourcemanager.googleapis.com/Folder",
                Folder,
                FOLDER_RESOURCE,
                &["parent", "display_name"],
            )
            .resource(
                "google_organization_policy",
                "cloudresourcemanager.googleapis.com/Organization",
                Organization,
                default,
                &["org_id", "constraint"],
            )
            .resource(
                "google_folder_organization_policy",
                "cloudresourcemanager.googleapis.com/Folder",
                Generic,
                default,
                &["folder", "constraint"],
            )
            .resource(
                "google_project_organization_policy",
                "cloudresourcemanager.googleapis.com/Project",
                Generic,
                default,
                &["project", "constraint"],
            )
            .resource(
                "google_org_policy_policy",
                "orgpolicy.googleapis.com/Policy",
                Generic,
                default,
                &["name"],
            )
            // iam
            .resource(
                "google_organization_iam_custom_role",
                "iam.googleapis.com/Role",
                CustomRole,
                default,
                &["org_id", "role_id"],
            )
            .resource(
                "google_project_iam_custom_role",
                "iam.googleapis.com/Role",
                CustomRole,
                default,
                &["project", "role_id"],
            )
            .resource(
                "google_service_account",
                "iam.googleapis.com/ServiceAccount",
                Generic,
                default,
                &["project", "account_id"],
            )
            .binding_family(
                "google_service_account_iam",
                "iam.googleapis.com/ServiceAccount",
                Generic,
                default,
            )
            // compute
            .resource(
                "google_compute_instance",
                "compute.googleapis.com/Instance",
                Generic,
                default,
                &["project", "zone", "name"],
            )
            .binding_family(
                "google_compute_instance_iam",
                "compute.googleapis.com/Instance",
                Generic,
                default,
            )
            .resource(
                "google_compute_disk",
                "compute.googleapis.com/Disk",
                Generic,
                default,
                &["project", "zone", "name"],
            )
            .resource(
                "google_compute_network",
                "compute.googleapis.com/Network",
                Generic,
                default,
                &["project", "name"],
            )
            .resource(
                "google_compute_subnetwork",
                "compute.googleapis.com/Subnetwork",
                Generic,
                default,
                &["project", "region", "name"],
            )
            .resource(
                "google_compute_firewall",
                "compute.googleapis.com/Firewall",
                Generic,
                default,
                &["project", "name"],
            )
            // storage
            .resource(
                "google_storage_bucket",
                "storage.googleapis.com/Bucket",
                Generic,
                default,
                &["name"],
            )
            .binding_family(
                "google_storage_bucket_iam",
                "storage.googleapis.com/Bucket",
                Generic,
                default,
            )
            // pubsub
            .resource(
                "google_pubsub_topic",
                "pubsub.googleapis.com/Topic",
                Generic,
                default,
                &["project", "name"],
            )
            .binding_family(
                "google_pubsub_topic_iam",
                "pubsub.googleapis.com/Topic",
                Generic,
                default,
            )
            .resource(
                "google_pubsub_subscription",
                "pubsub.googleapis.com/Subscription",
                Generic,
                default,
                &["project", "name"],
            )
            .binding_family(
                "google_pubsub_subscription_iam",
                "pubsub.googleapis.com/Subscription",
                Generic,
                default,
            )
            // kms
            .resource(
                "google_kms_key_ring",
                "cloudkms.googleapis.com/KeyRing",
                Generic,
                default,
                &["project", "location", "name"],
            )
            .binding_family(
                "google_kms_key_ring_iam",
                "cloudkms.googleapis.com/KeyRing",
                Generic,
                default,
            )
            .binding_family(
                "google_kms_crypto_key_iam",
                "cloudkms.googleapis.com/CryptoKey",
                Generic,
                default,
            )
            // bigquery
            .resource(
                "google_bigquery_dataset",
                "bigquery.googleapis.com/Dataset",
                Generic,
                default,
                &["project", "dataset_id"],
            )
            .binding_family(
                "google_bigquery_dataset_iam",
                "bigquery.googleapis.com/Dataset",
                Generic,
                default,
            )
            // secret manager, spanner, cloud run
            .binding_family(
                "google_secret_manager_secret_iam",
                "secretmanager.googleapis.com/Secret",
                Generic,
                default,
            )
            .binding_family(
                "google_spanner_instance_iam",
                "spanner.googleapis.com/Instance",
                Generic,
                default,
            )
            .binding_family(
                "google_spanner_database_iam",
                "spanner.googleapis.com/Database",
                Generic,
                default,
            )
            .binding_family(
                "google_cloud_run_service_iam",
                "run.googleapis.com/Service",
                Generic,
                default,
            )
            // misc
            .resource(
                "google_project_service",
                "serviceusage.googleapis.com/Service",
                Generic,
                default,
                &["project", "service"],
            )
            .resource(
                "google_apigee_instance",
                "apigee.googleapis.com/Instance",
                ProjectOnly,
                PROJECT_ONLY,
                &["org_id", "name"],
            );

        registry
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn binding_family_registers_all_facets() {
        let registry = Registry::builtin();
        for (resource_type, facet) in [
            ("google_compute_instance_iam_member", BindingFacet::Member),
            ("google_compute_instance_iam_binding", BindingFacet::Binding),
            ("google_compute_instance_iam_policy", BindingFacet::Policy),
        ] {
            let descriptor = registry.get(resource_type).unwrap();
            assert_eq!(descriptor.binding, Some(facet));
            assert_eq!(descriptor.family, "google_compute_instance_iam");
            assert_eq!(descriptor.asset_type, "compute.googleapis.com/Instance");
        }
    }

    #[test]
    fn custom_roles_are_not_binding_facets() {
        let registry = Registry::builtin();
        let role = registry.get("google_organization_iam_custom_role").unwrap();
        assert!(!role.is_binding());
        assert_eq!(role.strategy, Strategy::CustomRole);
    }

    #[test]
    fn unknown_types_are_absent() {
        assert!(Registry::builtin().get("google_not_a_thing").is_none());
    }

    #[test]
    fn project_resource_reads_number_first() {
        let registry = Registry::builtin();
        let project = registry.get("google_project").unwrap();
        assert_eq!(project.strategy, Strategy::Project);
        assert_eq!(project.containers.project, &["number", "project_id"]);
    }
}
