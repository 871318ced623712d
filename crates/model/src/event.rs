//! The canonical enriched event
//!
//! A flat record of optional string fields, mutable while the enrichment
//! chain runs, serialized to one tab-separated line afterwards. The field
//! list and its order are the wire contract with downstream consumers, so
//! both are declared exactly once in [`atomic_fields!`] and everything else
//! (TSV order, lookup by name, field count) derives from it.

/// Declares the event struct together with its canonical column order.
///
/// Generates `EnrichedEvent` with one `Option<String>` per field, plus
/// name-based accessors and the TSV serializer that walks the fields in
/// declaration order.
macro_rules! atomic_fields {
    ($($field:ident),+ $(,)?) => {
        /// Canonical flat event produced by the enrichment chain.
        ///
        /// All fields start empty; the payload mapping and the enrichments
        /// fill them in. Later enrichments may overwrite what earlier ones
        /// wrote.
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct EnrichedEvent {
            $(pub $field: Option<String>,)+
        }

        impl EnrichedEvent {
            /// Number of columns in the canonical model.
            pub const FIELD_COUNT: usize = [$(stringify!($field)),+].len();

            /// Field names in canonical column order.
            pub const FIELD_NAMES: [&'static str; Self::FIELD_COUNT] =
                [$(stringify!($field)),+];

            /// Look up a field value by its canonical name.
            pub fn get(&self, name: &str) -> Option<&str> {
                match name {
                    $(stringify!($field) => self.$field.as_deref(),)+
                    _ => None,
                }
            }

            /// Set a field by its canonical name.
            ///
            /// Returns false (and changes nothing) for an unknown name.
            pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
                match name {
                    $(stringify!($field) => {
                        self.$field = Some(value.into());
                        true
                    })+
                    _ => false,
                }
            }

            /// Serialize to one tab-separated line in canonical column
            /// order. Empty fields become empty columns; embedded tabs and
            /// line breaks are flattened to spaces so one event is always
            /// exactly one line.
            pub fn to_tsv(&self) -> String {
                let mut out = String::with_capacity(512);
                let mut first = true;
                $(
                    if !first {
                        out.push('\t');
                    }
                    first = false;
                    if let Some(v) = self.$field.as_deref() {
                        push_sanitized(&mut out, v);
                    }
                )+
                let _ = first;
                out
            }
        }
    };
}

/// Append `value`, flattening characters that would break the row shape.
fn push_sanitized(out: &mut String, value: &str) {
    if value.contains(['\t', '\n', '\r']) {
        for ch in value.chars() {
            match ch {
                '\t' | '\n' | '\r' => out.push(' '),
                other => out.push(other),
            }
        }
    } else {
        out.push_str(value);
    }
}

atomic_fields! {
    // application
    app_id,
    platform,
    // timestamps
    etl_tstamp,
    collector_tstamp,
    dvce_created_tstamp,
    // event metadata
    event,
    event_id,
    txn_id,
    // versioning
    name_tracker,
    v_tracker,
    v_collector,
    v_etl,
    // user and visit
    user_id,
    user_ipaddress,
    user_fingerprint,
    domain_userid,
    domain_sessionidx,
    network_userid,
    // location
    geo_country,
    geo_region,
    geo_city,
    geo_zipcode,
    geo_latitude,
    geo_longitude,
    geo_region_name,
    // ip lookup
    ip_isp,
    ip_organization,
    ip_domain,
    ip_netspeed,
    // page
    page_url,
    page_title,
    page_referrer,
    page_urlscheme,
    page_urlhost,
    page_urlport,
    page_urlpath,
    page_urlquery,
    page_urlfragment,
    // referrer
    refr_urlscheme,
    refr_urlhost,
    refr_urlport,
    refr_urlpath,
    refr_urlquery,
    refr_urlfragment,
    refr_medium,
    refr_source,
    refr_term,
    // marketing
    mkt_medium,
    mkt_source,
    mkt_term,
    mkt_content,
    mkt_campaign,
    // custom contexts
    contexts,
    // structured event
    se_category,
    se_action,
    se_label,
    se_property,
    se_value,
    // self-describing event
    unstruct_event,
    // transaction
    tr_orderid,
    tr_affiliation,
    tr_total,
    tr_tax,
    tr_shipping,
    tr_city,
    tr_state,
    tr_country,
    // transaction item
    ti_orderid,
    ti_sku,
    ti_name,
    ti_category,
    ti_price,
    ti_quantity,
    // page ping
    pp_xoffset_min,
    pp_xoffset_max,
    pp_yoffset_min,
    pp_yoffset_max,
    // user agent
    useragent,
    // browser
    br_name,
    br_family,
    br_version,
    br_type,
    br_renderengine,
    br_lang,
    br_features_pdf,
    br_features_flash,
    br_features_java,
    br_features_director,
    br_features_quicktime,
    br_features_realplayer,
    br_features_windowsmedia,
    br_features_gears,
    br_features_silverlight,
    br_cookies,
    br_colordepth,
    br_viewwidth,
    br_viewheight,
    // operating system
    os_name,
    os_family,
    os_manufacturer,
    os_timezone,
    // device
    dvce_type,
    dvce_ismobile,
    dvce_screenwidth,
    dvce_screenheight,
    // document
    doc_charset,
    doc_width,
    doc_height,
    // currency
    tr_currency,
    tr_total_base,
    tr_tax_base,
    tr_shipping_base,
    ti_currency,
    ti_price_base,
    base_currency,
    // extra location
    geo_timezone,
    // click attribution
    mkt_clickid,
    mkt_network,
    // etl
    etl_tags,
    dvce_sent_tstamp,
    // cross-domain
    refr_domain_userid,
    refr_dvce_tstamp,
    // derived
    derived_contexts,
    domain_sessionid,
    derived_tstamp,
    // event classification
    event_vendor,
    event_name,
    event_format,
    event_version,
    // fingerprint
    event_fingerprint,
    // true timestamp
    true_tstamp,
}
