macro_rules! opaque_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Borrows the id as a plain string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

opaque_id!(JobId, "Identifier of a [`crate::Job`], unique within the coordinator.");
opaque_id!(MinerId, "Identifier of a [`crate::Miner`], unique within the coordinator.");
opaque_id!(ReceiptId, "Identifier of a [`crate::Receipt`], derived deterministically from `(job_id, attempt)`.");
opaque_id!(PaymentId, "Identifier of a [`crate::Payment`], unique within the coordinator.");
opaque_id!(TenantId, "Isolation boundary every entity carries; API operations only see their tenant's rows.");
opaque_id!(SubmitterId, "Identifier of the client that submitted a job.");
