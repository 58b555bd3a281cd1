/// Cross-domain policy served to `<policy-file-request/>` probes.
pub const POLICY_RESPONSE: &str = concat!(
    "<?xml version=\"1.0\"?>\n",
    "<cross-domain-policy>\n",
    "   <allow-access-from domain=\"*\" to-ports=\"*\"/>\n",
    "   <site-control permitted-cross-domain-policies=\"all\"/>\n",
    "</cross-domain-policy>\n",
    "\0",
);

pub fn handshake() -> Vec<u8> {
    POLICY_RESPONSE.as_bytes().to_vec()
}
